use crate::models::route::RouteColor;

const PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEEAD", "#D4A5A5", "#9B59B6", "#3498DB",
    "#E67E22", "#2ECC71",
];

/// Hands out route colors in palette order. The counter never rewinds, so a
/// deleted route's color is not immediately reissued.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorAllocator {
    issued: usize,
}

impl ColorAllocator {
    pub fn next_color(&mut self) -> RouteColor {
        let base = PALETTE[self.issued % PALETTE.len()];
        self.issued += 1;

        RouteColor {
            color: base.to_string(),
            color_dimmed: dim(base),
        }
    }
}

/// Blends a `#RRGGBB` color halfway toward white.
pub fn dim(hex: &str) -> String {
    let channels = parse_hex(hex).unwrap_or((0x80, 0x80, 0x80));
    let blend = |c: u8| c + (255 - c) / 2;
    format!(
        "#{:02X}{:02X}{:02X}",
        blend(channels.0),
        blend(channels.1),
        blend(channels.2)
    )
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
