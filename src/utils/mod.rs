/// Format a file size in human-readable form, e.g. `1.5KB`, `700B` or `1,024KB`.
///
/// A unit is used once the size is strictly above it. The value keeps at most
/// two fractional digits, rounded half down, without trailing zeros, and the
/// integer part is grouped by thousands.
pub fn format_size(size: u64) -> String {
    const UNITS: [(u64, &str); 3] = [
        (1024 * 1024 * 1024, "GB"),
        (1024 * 1024, "MB"),
        (1024, "KB"),
    ];

    let (scale, unit) = UNITS
        .into_iter()
        .find(|(scale, _)| size > *scale)
        .unwrap_or((1, "B"));

    let scale = scale as u128;
    let scaled = size as u128 * 100;
    let mut hundredths = scaled / scale;
    // Exact ties round down
    if (scaled % scale) * 2 > scale {
        hundredths += 1;
    }

    let mut text = group_thousands(hundredths / 100);
    let fraction = format!("{:02}", hundredths % 100);
    let fraction = fraction.trim_end_matches('0');
    if !fraction.is_empty() {
        text.push('.');
        text.push_str(fraction);
    }
    text.push_str(unit);
    text
}

fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

/// True for a plain file name that stays inside a flat working directory
pub fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
