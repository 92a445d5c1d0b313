//! Integration tests for image and update storage across restarts.
//!
//! A restart is modelled by cloning the backing [`MemFlash`] and opening a
//! fresh store on it.

use crate::mock_hw::{REGION_SIZE, data_flash, valid_region};

use romemu::adapters::flash::MemFlash;
use romemu::app::ports::FlashPort;
use romemu::rpc::packet::Source;
use romemu::storage::update_store::{BootRegion, select_boot_region};
use romemu::storage::{BLOCK_SIZE, ImageStore, SUPERBLOCK_COUNT, StoreError, UpdateStore};

fn upload(store: &mut ImageStore<MemFlash>, slot: u8, name: &[u8], data: &[u8]) {
    store.write_begin(Source::Usb, slot, name).unwrap();
    store.write_data(Source::Usb, data).unwrap();
    store.write_end(Source::Usb).unwrap();
}

fn reopen(store: &ImageStore<MemFlash>) -> ImageStore<MemFlash> {
    let mut flash = store.flash().clone();
    flash.restore_power();
    ImageStore::open(flash).unwrap()
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn identical_reupload_touches_only_the_catalog() {
    let mut store = ImageStore::open(data_flash()).unwrap();
    let data: Vec<u8> = (0..2 * BLOCK_SIZE + 300).map(|i| (i * 13 % 256) as u8).collect();
    upload(&mut store, 6, b"SAME", &data);
    store.flash_mut().reset_counters();

    upload(&mut store, 6, b"SAME", &data);
    // Two commits onto never-used catalog copies; no image block changes.
    assert_eq!(store.flash().erase_count(), 0);
    assert_eq!(store.flash().program_count(), 2);
    assert_eq!(store.get_contents(6).unwrap(), data.as_slice());
}

#[test]
fn catalog_survives_restart_after_rotation_wraps() {
    let mut store = ImageStore::open(data_flash()).unwrap();
    // Two commits per upload: 40 commits wrap the rotation more than twice.
    for i in 0..20u8 {
        let slot = i % 16;
        upload(&mut store, slot, &[b'A' + slot], &vec![i; 100 + usize::from(i)]);
    }

    let reopened = reopen(&store);
    assert_eq!(reopened.generation(), store.generation());
    assert_eq!(reopened.write_index(), store.write_index());
    for slot in 0..16u8 {
        let last = if slot < 4 { slot + 16 } else { slot };
        let info = reopened.get_info(slot).unwrap();
        assert_eq!(info.name.as_slice(), &[b'A' + slot]);
        assert_eq!(
            reopened.get_contents(slot).unwrap(),
            vec![last; 100 + usize::from(last)].as_slice()
        );
    }
}

#[test]
fn reopened_store_keeps_committing_in_sequence() {
    let mut store = ImageStore::open(data_flash()).unwrap();
    upload(&mut store, 0, b"one", b"1");
    let mut store = reopen(&store);
    upload(&mut store, 1, b"two", b"22");

    let reopened = reopen(&store);
    assert_eq!(reopened.get_contents(0).unwrap(), b"1");
    assert_eq!(reopened.get_contents(1).unwrap(), b"22");
    assert_eq!(reopened.generation(), u32::MAX - 4);
}

#[test]
fn corrupt_newest_copy_falls_back_to_previous() {
    let mut store = ImageStore::open(data_flash()).unwrap();
    upload(&mut store, 2, b"old", b"first");
    let newest = (store.write_index() + SUPERBLOCK_COUNT - 1) % SUPERBLOCK_COUNT;
    store.write_begin(Source::Usb, 3, b"pending").unwrap();

    // Flip bits in the body of the copy write_begin just produced.
    let written = (newest + 1) % SUPERBLOCK_COUNT;
    let mut flash = store.flash().clone();
    flash.program(written * BLOCK_SIZE + 12, &[0x00; 4]).unwrap();

    let reopened = ImageStore::open(flash).unwrap();
    assert_eq!(reopened.get_contents(2).unwrap(), b"first");
    assert_eq!(reopened.get_info(3).unwrap().name.as_slice(), b"");
    assert_eq!(reopened.write_index(), written);
}

#[test]
fn unfinished_upload_is_absent_after_restart() {
    let mut store = ImageStore::open(data_flash()).unwrap();
    upload(&mut store, 4, b"v1", &[1; 3000]);
    store.write_begin(Source::Usb, 4, b"v2").unwrap();
    store.write_data(Source::Usb, &[2; 6000]).unwrap();

    let reopened = reopen(&store);
    let info = reopened.get_info(4).unwrap();
    assert!(!info.is_present());
    assert_eq!(info.name.as_slice(), b"v2");
    assert_eq!(reopened.get_contents(4), Err(StoreError::EmptySlot));
    assert!(reopened.session().is_none());
}

// ── Power loss ────────────────────────────────────────────────

#[test]
fn power_cut_during_commit_keeps_last_catalog() {
    let mut store = ImageStore::open(data_flash()).unwrap();
    upload(&mut store, 0, b"keep", b"data");

    store.flash_mut().cut_power_after(0, false);
    assert!(matches!(
        store.write_begin(Source::Usb, 0, b"lost"),
        Err(StoreError::Storage(_))
    ));

    let reopened = reopen(&store);
    assert_eq!(reopened.get_info(0).unwrap().name.as_slice(), b"keep");
    assert_eq!(reopened.get_contents(0).unwrap(), b"data");
}

#[test]
fn torn_erase_of_reused_copy_keeps_last_catalog() {
    let mut store = ImageStore::open(data_flash()).unwrap();
    // Fill every copy once so the next commit must erase.
    while store.generation() > u32::MAX - SUPERBLOCK_COUNT as u32 {
        store.commit().unwrap();
    }
    upload(&mut store, 6, b"six", b"666");

    store.flash_mut().cut_power_after(0, true);
    assert!(store.write_begin(Source::Usb, 7, b"seven").is_err());

    let reopened = reopen(&store);
    assert_eq!(reopened.get_contents(6).unwrap(), b"666");
    assert_eq!(reopened.generation(), store.generation() + 1);
}

// ── Controller update ─────────────────────────────────────────

#[test]
fn update_then_update_back() {
    let mut a = valid_region();
    let mut b = MemFlash::new(REGION_SIZE);
    assert_eq!(select_boot_region(&a, &b), BootRegion::A);

    {
        let mut ota = UpdateStore::open(&mut a, &mut b).unwrap();
        ota.ota_begin(Source::Usb).unwrap();
        ota.ota_data(Source::Usb, b"firmware-2").unwrap();
        assert_eq!(ota.ota_end(Source::Usb).unwrap(), 10);
    }
    assert_eq!(select_boot_region(&a, &b), BootRegion::B);
    assert_eq!(b.read(0, 10).unwrap(), b"firmware-2");

    // After restarting into B, A becomes the inactive region.
    {
        let mut ota = UpdateStore::open(&mut b, &mut a).unwrap();
        ota.ota_begin(Source::Network).unwrap();
        ota.ota_data(Source::Network, b"firmware-3").unwrap();
        ota.ota_end(Source::Network).unwrap();
    }
    assert_eq!(select_boot_region(&a, &b), BootRegion::A);
    assert_eq!(a.read(0, 10).unwrap(), b"firmware-3");
}

#[test]
fn interrupted_update_keeps_running_region() {
    let mut a = valid_region();
    let mut b = valid_region();
    {
        let mut ota = UpdateStore::open(&mut a, &mut b).unwrap();
        ota.ota_begin(Source::Usb).unwrap();
        ota.ota_data(Source::Usb, &[0x11; 5000]).unwrap();
    }
    // A stale marker in B must not survive ota_begin.
    assert_eq!(select_boot_region(&a, &b), BootRegion::A);
    assert!(!romemu::storage::update_store::region_is_valid(&b));
}
