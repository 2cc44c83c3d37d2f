//! End-to-end scenarios exercised against [`host_sim::SimFlash`], using the
//! literal sizes worked through by hand: 16-bit words, 128-byte pages, a
//! 6-byte header, a 4-byte payload, 10 bytes per record, 122 usable bytes
//! per page, 12 records per full page.

use host_sim::SimFlash;
use pretty_assertions::assert_eq;

use crate::{Error, VariableStore};

const PAGE_SIZE: usize = 128;
const PAGE0: usize = 0;
const PAGE1: usize = 128;
const CAPACITY: u16 = 12;

type Flash = SimFlash<u16>;
type Store = VariableStore<u16, Flash>;

fn new_store() -> Store {
    let flash = Flash::new_erased(PAGE_SIZE, 2);
    VariableStore::new(flash, PAGE0, PAGE1, PAGE_SIZE).unwrap()
}

fn fill_to_capacity(store: &mut Store) {
    for id in 1..=CAPACITY {
        let handle = store.get(id, 4).unwrap();
        store.write(id, 4, &(id as u32).to_le_bytes()).unwrap();
        assert_eq!(handle.size(), 4);
    }
}

#[test]
fn fresh_store_reads_erased() {
    let mut store = new_store();
    let handle = store.get(1, 4).unwrap();
    let mut buf = [0u8; 4];
    handle.read(store.hal_ref(), &mut buf);
    assert_eq!(buf, [0xFF; 4]);
    assert!(!store.is_used());
}

#[test]
fn simple_write_then_read() {
    let mut store = new_store();
    let handle = store.get(7, 4).unwrap();
    store.write(7, 4, &0xDEAD_BEEFu32.to_le_bytes()).unwrap();
    let mut buf = [0u8; 4];
    handle.read(store.hal_ref(), &mut buf);
    assert_eq!(buf, 0xDEAD_BEEFu32.to_le_bytes());
    assert_eq!(store.used_bytes().unwrap(), 4);
}

#[test]
fn writing_the_same_payload_twice_is_a_no_op() {
    let mut store = new_store();
    store.get(7, 4).unwrap();
    store.write(7, 4, &[1, 2, 3, 4]).unwrap();
    let calls_after_first = store.hal_ref().program_call_count();
    store.write(7, 4, &[1, 2, 3, 4]).unwrap();
    assert_eq!(store.hal_ref().program_call_count(), calls_after_first);
}

#[test]
fn filling_the_page_then_asking_for_one_more_is_rejected() {
    let mut store = new_store();
    fill_to_capacity(&mut store);
    assert_eq!(store.used_bytes().unwrap(), (CAPACITY as usize) * 4);
    match store.get(CAPACITY + 1, 4) {
        Err(Error::OutOfSpace) => {}
        other => panic!("expected OutOfSpace, got {:?}", other),
    }
}

#[test]
fn rewrite_at_tail_leaves_the_new_value_live_and_the_old_one_tombstoned() {
    let mut store = new_store();
    store.get(1, 4).unwrap();
    store.write(1, 4, &1u32.to_le_bytes()).unwrap();
    store.write(1, 4, &2u32.to_le_bytes()).unwrap();

    let handle = store.get(1, 4).unwrap();
    let mut buf = [0u8; 4];
    handle.read(store.hal_ref(), &mut buf);
    assert_eq!(u32::from_le_bytes(buf), 2);
    // two ten-byte records: the tombstoned original and the live rewrite.
    assert_eq!(store.used_bytes().unwrap(), 4);
}

#[test]
fn rewriting_a_full_page_triggers_a_roll() {
    let mut store = new_store();
    fill_to_capacity(&mut store);

    // the page is completely full (120 of 122 usable bytes); rewriting any
    // one record cannot fit a fresh copy at the tail and must roll.
    store.write(5, 4, &0xAAAA_AAAAu32.to_le_bytes()).unwrap();

    let handle = store.get(5, 4).unwrap();
    let mut buf = [0u8; 4];
    handle.read(store.hal_ref(), &mut buf);
    assert_eq!(u32::from_le_bytes(buf), 0xAAAA_AAAA);

    // the roll left out the old id 5 entry and appended the new one in its
    // place; exactly the 12 ids remain, none duplicated.
    assert_eq!(store.used_bytes().unwrap(), (CAPACITY as usize) * 4);
    for id in 1..=CAPACITY {
        assert!(store.get(id, 4).is_ok());
    }
}

#[test]
fn delete_then_reuse_allocates_a_fresh_record() {
    let mut store = new_store();
    store.get(3, 4).unwrap();
    store.write(3, 4, &[9, 9, 9, 9]).unwrap();
    store.delete(3, 4).unwrap();

    // deleting twice is fine.
    store.delete(3, 4).unwrap();

    let handle = store.get(3, 4).unwrap();
    let mut buf = [0xAAu8; 4];
    handle.read(store.hal_ref(), &mut buf);
    assert_eq!(buf, [0xFF; 4], "reused id reads back erased, not the old payload");
}

#[test]
fn write_to_an_id_never_gotten_is_not_found() {
    let mut store = new_store();
    match store.write(42, 4, &[0, 0, 0, 0]) {
        Err(Error::NotFound) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn crash_at_any_point_during_a_rewrite_recovers_to_one_of_the_two_legal_values() {
    // Build a reference flash with one committed record, then capture the
    // byte state right before the crash-prone rewrite.
    let before = {
        let flash = Flash::new_erased(PAGE_SIZE, 2);
        let mut setup = VariableStore::new(flash, PAGE0, PAGE1, PAGE_SIZE).unwrap();
        setup.get(1, 4).unwrap();
        setup.write(1, 4, &1u32.to_le_bytes()).unwrap();
        setup.hal_ref().snapshot()
    };

    // Sweep every word-program call a rewrite could make; a rewrite that
    // never rolls stays well under this many calls.
    for call in 1..=32u32 {
        let mut flash = Flash::from_bytes(PAGE_SIZE, before.clone());
        flash.fail_after(call as usize);
        let mut store = VariableStore::new(flash, PAGE0, PAGE1, PAGE_SIZE).unwrap();
        let _ = store.write(1, 4, &2u32.to_le_bytes());

        let rebooted_flash = Flash::from_bytes(PAGE_SIZE, store.hal_ref().snapshot());
        let mut rebooted = VariableStore::new(rebooted_flash, PAGE0, PAGE1, PAGE_SIZE).unwrap();
        let handle = rebooted.get(1, 4).unwrap();
        let mut buf = [0u8; 4];
        handle.read(rebooted.hal_ref(), &mut buf);
        let value = u32::from_le_bytes(buf);
        assert!(
            value == 1 || value == 2,
            "call {} left an impossible value {:#x}",
            call,
            value
        );
    }
}

#[test]
fn crash_at_any_point_during_a_rewrite_that_triggers_a_roll_recovers_to_one_of_the_two_legal_values() {
    // Fill the page to capacity, then capture the byte state right before
    // the rewrite that cannot fit at the tail and must roll.
    let before = {
        let flash = Flash::new_erased(PAGE_SIZE, 2);
        let mut setup = VariableStore::new(flash, PAGE0, PAGE1, PAGE_SIZE).unwrap();
        fill_to_capacity(&mut setup);
        setup.hal_ref().snapshot()
    };

    // Sweep every word-program call the roll could make: copying the eleven
    // untouched records, appending the new id-5 record, activating the
    // destination page, and erasing the source.
    for call in 1..=150u32 {
        let mut flash = Flash::from_bytes(PAGE_SIZE, before.clone());
        flash.fail_after(call as usize);
        let mut store = VariableStore::new(flash, PAGE0, PAGE1, PAGE_SIZE).unwrap();
        let _ = store.write(5, 4, &0xAAAA_AAAAu32.to_le_bytes());

        let rebooted_flash = Flash::from_bytes(PAGE_SIZE, store.hal_ref().snapshot());
        let mut rebooted = VariableStore::new(rebooted_flash, PAGE0, PAGE1, PAGE_SIZE).unwrap();

        let handle = rebooted.get(5, 4).unwrap();
        let mut buf = [0u8; 4];
        handle.read(rebooted.hal_ref(), &mut buf);
        let value = u32::from_le_bytes(buf);
        assert!(
            value == 5 || value == 0xAAAA_AAAA,
            "call {} left an impossible value {:#x} for id 5",
            call,
            value
        );

        // whichever page recovery picked, every other id must still read
        // back its original value untouched.
        for id in 1..=CAPACITY {
            if id == 5 {
                continue;
            }
            let handle = rebooted.get(id, 4).unwrap();
            let mut buf = [0u8; 4];
            handle.read(rebooted.hal_ref(), &mut buf);
            assert_eq!(
                u32::from_le_bytes(buf),
                id as u32,
                "call {} corrupted id {}",
                call,
                id
            );
        }
    }
}
