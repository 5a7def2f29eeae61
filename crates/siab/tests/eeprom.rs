//! Write-if-changed properties of the configuration store

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use platform::mocks::MockEeprom;
use proptest::prelude::*;
use siab::EepromConfigStore;

proptest! {
    #[test]
    fn second_identical_word_write_programs_nothing(
        fill in any::<u8>(),
        addr in 0u16..1022,
        value in any::<u16>(),
    ) {
        let mut eeprom = MockEeprom::filled(1024, fill);
        let mut store = EepromConfigStore::new(&mut eeprom);
        let [hi, lo] = value.to_be_bytes();
        store.write_word_if_changed(addr, hi, lo).unwrap();
        prop_assert_eq!(store.read_word(addr).unwrap(), value);
        prop_assert_eq!(store.write_word_if_changed(addr, hi, lo).unwrap(), 0);
    }

    #[test]
    fn entry_write_touches_only_differing_bytes(
        old in any::<[u8; 3]>(),
        new in any::<[u8; 3]>(),
    ) {
        let mut eeprom = MockEeprom::filled(256, 0);
        {
            let mut store = EepromConfigStore::new(&mut eeprom);
            store.write_entry_if_changed(100, old[0], old[1], old[2]).unwrap();
        }
        eeprom.reset_write_count();
        let written = EepromConfigStore::new(&mut eeprom)
            .write_entry_if_changed(100, new[0], new[1], new[2])
            .unwrap();
        let differing = old.iter().zip(&new).filter(|(a, b)| a != b).count();
        prop_assert_eq!(written, differing);
        prop_assert_eq!(eeprom.write_count(), differing);
    }
}
