// Board colours.
//
// Each object value has a colour from a fixed seven-entry palette (values
// past the end wrap around). While a room is being played every slot shows
// its object's colour. Once solved, only the slot each actor ended up with
// keeps its colour and every other slot is dimmed.

use crate::room::RoomStatus;

pub const PALETTE: [&str; 7] = [
    "#406E8E", // blue
    "#F4AC45", // yellow
    "#E15554", // red
    "#3BB273", // green
    "#9983EC", // purple
    "#30B8F6", // light blue
    "#988383",
];

pub const DIM: &str = "#614B63";

/// Background colour for a slot holding an object of `value`. `selected` is
/// whether the owning actor picked this slot.
pub fn object_color(value: i64, selected: bool, status: RoomStatus) -> &'static str {
    if status == RoomStatus::Solved && !selected {
        return DIM;
    }
    PALETTE[value.rem_euclid(PALETTE.len() as i64) as usize]
}

/// Parse `#RRGGBB`.
pub fn rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}
