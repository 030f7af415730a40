//! Output grammars: pure parsers over captured command output.

use std::sync::LazyLock;

use regex::Regex;

/// Parses the text one command printed into ordered records.
pub trait OutputGrammar {
    type Record;

    fn parse(&self, text: &str) -> Vec<Self::Record>;
}

// =============================================================================
// show epon active-onu
// =============================================================================

static ACTIVE_ONU_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(EPON\d+/\d+:\d+)\s+([a-f\d.]{14})\s+([\w-]+)\s+([\w-]+)\s+(\d+)\s+(\d+)\s+",
        r"(\d{4}\.\d{2}\.\d{2}\.\d{2}:\d{2}:\d{2})\s+(\d{4}\.\d{2}\.\d{2}\.\d{2}:\d{2}:\d{2})\s",
        r"(llid-admin-down|power-off|unknow|wire-down)\s+(\d+\.\d{2}:\d{2}:\d{2})",
    ))
    .expect("active-onu regex")
});

/// One row of `show epon active-onu`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOnu {
    /// Upper-cased interface name, e.g. `EPON0/1:1`.
    pub interface: String,
    pub mac: String,
    pub status: String,
    pub oam_status: String,
    /// Fiber distance in meters.
    pub distance: u32,
    /// Round-trip time in time quanta.
    pub rtt: u32,
    pub last_registered: String,
    pub last_deregistered: String,
    pub dereg_reason: String,
    pub alive_time: String,
}

/// Grammar for BDCOM `show epon active-onu`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveOnuGrammar;

impl OutputGrammar for ActiveOnuGrammar {
    type Record = ActiveOnu;

    fn parse(&self, text: &str) -> Vec<ActiveOnu> {
        ACTIVE_ONU_RE
            .captures_iter(text)
            .filter_map(|c| {
                Some(ActiveOnu {
                    interface: c[1].to_uppercase(),
                    mac: format_mac(&c[2])?,
                    status: c[3].to_string(),
                    oam_status: c[4].to_string(),
                    distance: c[5].parse().ok()?,
                    rtt: c[6].parse().ok()?,
                    last_registered: c[7].to_string(),
                    last_deregistered: c[8].to_string(),
                    dereg_reason: c[9].to_lowercase(),
                    alive_time: c[10].to_string(),
                })
            })
            .collect()
    }
}

// =============================================================================
// show mac address-table
// =============================================================================

static CISCO_MAC_RE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"(?i)\b([a-f0-9]{4}\.[a-f0-9]{4}\.[a-f0-9]{4})\b").expect("mac regex")
    });

/// Grammar for `show mac address-table ...`: every MAC address in the
/// output, in order, as `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacTableGrammar;

impl OutputGrammar for MacTableGrammar {
    type Record = String;

    fn parse(&self, text: &str) -> Vec<String> {
        CISCO_MAC_RE
            .find_iter(text)
            .filter_map(|m| format_mac(m.as_str()))
            .collect()
    }
}

/// Normalise `aabb.ccdd.eeff` (or any 12 hex digits with separators) to
/// `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(raw: &str) -> Option<String> {
    let hex: Vec<char> = raw
        .chars()
        .filter(|c| !matches!(c, '.' | ':' | '-'))
        .collect();
    if hex.len() != 12 || !hex.iter().all(char::is_ascii_hexdigit) {
        return None;
    }
    let pairs: Vec<String> = hex
        .chunks(2)
        .map(|p| p.iter().collect::<String>().to_uppercase())
        .collect();
    Some(pairs.join(":"))
}
