//! Discord markdown helpers for log messages.

/// Escape characters Discord would interpret as formatting.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '`' | '*' | '_' | '~' | '|' | '>') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Wrap `text` in an inline code span.
///
/// Backticks cannot be escaped inside a span, so they are replaced.
pub fn inline_code(text: &str) -> String {
    let text = text.replace('`', "'");
    if text.trim().is_empty() {
        "` `".to_string()
    } else {
        format!("`{}`", text)
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

const WHITE_FLAG: &str = "\u{1F3F3}\u{FE0F}";

/// Flag emoji for an ISO 3166-1 numeric country code.
///
/// Unknown codes (the game uses -1) get a white flag.
pub fn flag(country: i32) -> String {
    alpha2(country)
        .and_then(|code| {
            let candidate: String = code
                .chars()
                .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
                .collect();
            emojis::get(&candidate).map(|emoji| emoji.as_str().to_string())
        })
        .unwrap_or_else(|| {
            emojis::get_by_shortcode("white_flag")
                .map(|emoji| emoji.as_str().to_string())
                .unwrap_or_else(|| WHITE_FLAG.to_string())
        })
}

fn alpha2(country: i32) -> Option<&'static str> {
    COUNTRIES
        .binary_search_by_key(&country, |(numeric, _)| *numeric)
        .ok()
        .map(|index| COUNTRIES[index].1)
}

/// Numeric to alpha-2 codes, sorted by numeric code.
const COUNTRIES: &[(i32, &str)] = &[
    (8, "AL"),
    (12, "DZ"),
    (32, "AR"),
    (36, "AU"),
    (40, "AT"),
    (50, "BD"),
    (56, "BE"),
    (70, "BA"),
    (76, "BR"),
    (100, "BG"),
    (112, "BY"),
    (124, "CA"),
    (152, "CL"),
    (156, "CN"),
    (170, "CO"),
    (188, "CR"),
    (191, "HR"),
    (192, "CU"),
    (196, "CY"),
    (203, "CZ"),
    (208, "DK"),
    (218, "EC"),
    (233, "EE"),
    (246, "FI"),
    (250, "FR"),
    (268, "GE"),
    (276, "DE"),
    (300, "GR"),
    (344, "HK"),
    (348, "HU"),
    (352, "IS"),
    (356, "IN"),
    (360, "ID"),
    (364, "IR"),
    (368, "IQ"),
    (372, "IE"),
    (376, "IL"),
    (380, "IT"),
    (392, "JP"),
    (398, "KZ"),
    (410, "KR"),
    (428, "LV"),
    (440, "LT"),
    (442, "LU"),
    (458, "MY"),
    (484, "MX"),
    (498, "MD"),
    (504, "MA"),
    (528, "NL"),
    (554, "NZ"),
    (578, "NO"),
    (586, "PK"),
    (604, "PE"),
    (608, "PH"),
    (616, "PL"),
    (620, "PT"),
    (642, "RO"),
    (643, "RU"),
    (682, "SA"),
    (688, "RS"),
    (702, "SG"),
    (703, "SK"),
    (704, "VN"),
    (705, "SI"),
    (710, "ZA"),
    (724, "ES"),
    (752, "SE"),
    (756, "CH"),
    (764, "TH"),
    (784, "AE"),
    (788, "TN"),
    (792, "TR"),
    (804, "UA"),
    (807, "MK"),
    (818, "EG"),
    (826, "GB"),
    (840, "US"),
    (858, "UY"),
    (862, "VE"),
];
