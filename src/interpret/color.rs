//! Color formatting and naming.

/// Common filament colors, matched exactly on RGB.
const NAMED_COLORS: &[(&str, &str)] = &[
    ("#000000", "Black"),
    ("#FFFFFF", "White"),
    ("#FF0000", "Red"),
    ("#00FF00", "Green"),
    ("#0000FF", "Blue"),
    ("#FFFF00", "Yellow"),
    ("#FF8800", "Orange"),
    ("#FF6A13", "Orange"),
    ("#800080", "Purple"),
    ("#FFC0CB", "Pink"),
    ("#808080", "Gray"),
    ("#8E9089", "Gray"),
    ("#C0C0C0", "Silver"),
    ("#A6A9AA", "Silver"),
    ("#FFD700", "Gold"),
    ("#E4BD68", "Gold"),
    ("#8B4513", "Brown"),
    ("#00FFFF", "Cyan"),
    ("#FF00FF", "Magenta"),
    ("#0A2989", "Blue"),
    ("#C12E1F", "Red"),
    ("#F4EE2A", "Yellow"),
    ("#00AE42", "Green"),
];

/// `#RRGGBB`, uppercase.
pub fn rgb_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02X}{g:02X}{b:02X}")
}

/// Human name for a `#RRGGBB` color, or the hex code itself.
pub fn name_for(hex: &str) -> String {
    let upper = hex.to_ascii_uppercase();
    NAMED_COLORS
        .iter()
        .find(|(code, _)| *code == upper)
        .map(|(_, name)| name.to_string())
        .unwrap_or(upper)
}

/// Parse `RRGGBB` (with or without `#`) into a normalized `#RRGGBB`.
pub fn normalize_hex(token: &str) -> Option<String> {
    let digits = token.strip_prefix('#').unwrap_or(token);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", digits.to_ascii_uppercase()))
}
