//! Chip-family addressing knowledge.
//!
//! maXTouch controllers answer on one bus address in application mode and
//! a different, family-dependent address in bootloader mode. The mapping
//! is a fixed offset per address range, with one newer family generation
//! using a shorter offset.

/// First family id of the generation that uses the `0x24` bootloader
/// offset on the `0x4A`/`0x4B` application addresses.
pub const FAMILY_ID_EXTENDED_OFFSET: u8 = 0xA2;

/// Bootloader-mode address for an application-mode address.
///
/// Returns `None` for addresses with no known bootloader mapping; callers
/// treat such an address as already being a bootloader address. Before
/// the info block has been read the family id is unknown (`None`), which
/// selects the classic `0x26` offsets.
pub fn bootloader_address(app_address: u8, family_id: Option<u8>) -> Option<u8> {
    match app_address {
        0x4A | 0x4B if family_id.is_some_and(|id| id >= FAMILY_ID_EXTENDED_OFFSET) => {
            Some(app_address - 0x24)
        }
        0x4A | 0x4B | 0x4C | 0x4D | 0x5A | 0x5B => Some(app_address - 0x26),
        _ => None,
    }
}
