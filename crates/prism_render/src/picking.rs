//! Index-as-color picking.
//!
//! Each of the 16 index bits lands in the high bits of one color channel, so
//! neighboring fragments get visibly different colors and the value survives
//! an 8-bit-per-channel round trip. Colors are packed RGBA8
//! (`r << 24 | g << 16 | b << 8 | a`).

use prism_core::GraphicsDevice;
use prism_math::Vec4;

/// Packed-color bit receiving each index bit, least significant first.
const INDEX_TO_COLOR_BIT: [u32; 16] = [
    15, 23, 31, 14, 22, 30, 13, 21, 29, 12, 20, 28, 11, 19, 27, 10,
];

/// Added to fragment indices so fragment 0 never encodes to black.
pub const FRAGMENT_INDEX_OFFSET: u16 = 7;

/// Encode a 16-bit index as an opaque color.
pub fn encode_index(index: u16) -> u32 {
    INDEX_TO_COLOR_BIT
        .iter()
        .enumerate()
        .filter(|(bit, _)| index & (1u16 << bit) != 0)
        .fold(0xff, |color, (_, &target)| color | (1u32 << target))
}

/// Recover the index from a packed color. Bits outside the map are ignored.
pub fn decode_color(color: u32) -> u16 {
    INDEX_TO_COLOR_BIT
        .iter()
        .enumerate()
        .filter(|(_, &source)| color & (1u32 << source) != 0)
        .fold(0u16, |index, (bit, _)| index | (1u16 << bit))
}

/// Largest fragment index that has a pick color.
pub const MAX_PICKABLE_FRAGMENT: usize = (u16::MAX - FRAGMENT_INDEX_OFFSET) as usize;

/// Color the fragment-index debug mode draws for `fragment`, or `None` once
/// the offset index no longer fits in 16 bits.
pub fn fragment_color(fragment: usize) -> Option<Vec4> {
    let index = u16::try_from(fragment)
        .ok()?
        .checked_add(FRAGMENT_INDEX_OFFSET)?;
    let color = encode_index(index);
    let channel = |shift: u32| ((color >> shift) & 0xff) as f32 / 255.0;
    Some(Vec4::new(channel(24), channel(16), channel(8), 1.0))
}

/// Read back the fragment under `(x, y)` after a fragment-index frame.
///
/// A zero pixel means nothing was drawn there. Overlays and the reference
/// grid must be off for the readback to be meaningful.
pub fn pick_fragment(device: &dyn GraphicsDevice, x: u32, y: u32) -> Option<usize> {
    let pixel = device.read_pixel(x, y)?;
    if pixel == 0 {
        return None;
    }
    Some(decode_color(pixel).wrapping_sub(FRAGMENT_INDEX_OFFSET) as usize)
}
