//! User-Agent classification.
//!
//! Each classifier is an ordered rule table evaluated top to bottom; the first
//! matching rule wins. Order encodes precedence: Edge and Opera UAs also
//! contain "chrome", iPhone UAs contain "mac os x", Android UAs contain
//! "linux", so the more specific rule must come first.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }
}

/// Predicate over a lower-cased User-Agent string.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    AnyOf(&'static [&'static str]),
    /// Every token in `all` present and none of `none`.
    AllNone {
        all: &'static [&'static str],
        none: &'static [&'static str],
    },
}

impl Matcher {
    pub fn matches(&self, ua: &str) -> bool {
        match self {
            Matcher::AnyOf(tokens) => tokens.iter().any(|t| ua.contains(t)),
            Matcher::AllNone { all, none } => {
                all.iter().all(|t| ua.contains(t)) && !none.iter().any(|t| ua.contains(t))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule<T: 'static> {
    pub matcher: Matcher,
    pub label: T,
}

/// First label whose matcher accepts `ua` (lower-cased before matching).
pub fn classify<T: Copy>(rules: &[Rule<T>], ua: &str) -> Option<T> {
    let ua = ua.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matcher.matches(&ua))
        .map(|rule| rule.label)
}

pub const DEVICE_RULES: &[Rule<DeviceType>] = &[
    Rule {
        matcher: Matcher::AnyOf(&["tablet", "ipad", "playbook", "silk"]),
        label: DeviceType::Tablet,
    },
    // Android phones advertise "Mobile"; Android tablets do not.
    Rule {
        matcher: Matcher::AllNone {
            all: &["android"],
            none: &["mobi"],
        },
        label: DeviceType::Tablet,
    },
    Rule {
        matcher: Matcher::AnyOf(&[
            "mobile",
            "iphone",
            "ipod",
            "android",
            "blackberry",
            "iemobile",
            "opera mini",
            "kindle",
            "webos",
        ]),
        label: DeviceType::Mobile,
    },
];

pub const BROWSER_RULES: &[Rule<&str>] = &[
    Rule {
        matcher: Matcher::AnyOf(&["samsungbrowser"]),
        label: "Samsung Internet",
    },
    Rule {
        matcher: Matcher::AnyOf(&["opr/", "opera"]),
        label: "Opera",
    },
    Rule {
        matcher: Matcher::AnyOf(&["edg"]),
        label: "Edge",
    },
    Rule {
        matcher: Matcher::AnyOf(&["firefox", "fxios"]),
        label: "Firefox",
    },
    Rule {
        matcher: Matcher::AnyOf(&["trident", "msie"]),
        label: "Internet Explorer",
    },
    Rule {
        matcher: Matcher::AnyOf(&["chrome", "crios"]),
        label: "Chrome",
    },
    Rule {
        matcher: Matcher::AnyOf(&["safari"]),
        label: "Safari",
    },
];

pub const OS_RULES: &[Rule<&str>] = &[
    Rule {
        matcher: Matcher::AnyOf(&["windows"]),
        label: "Windows",
    },
    Rule {
        matcher: Matcher::AnyOf(&["android"]),
        label: "Android",
    },
    Rule {
        matcher: Matcher::AnyOf(&["iphone", "ipad", "ipod"]),
        label: "iOS",
    },
    Rule {
        matcher: Matcher::AnyOf(&["mac os x", "macintosh"]),
        label: "macOS",
    },
    Rule {
        matcher: Matcher::AnyOf(&["cros"]),
        label: "ChromeOS",
    },
    Rule {
        matcher: Matcher::AnyOf(&["linux", "x11"]),
        label: "Linux",
    },
];

pub const UNKNOWN: &str = "Unknown";

pub fn detect_device_type(user_agent: &str) -> DeviceType {
    classify(DEVICE_RULES, user_agent).unwrap_or(DeviceType::Desktop)
}

pub fn detect_browser(user_agent: &str) -> &'static str {
    classify(BROWSER_RULES, user_agent).unwrap_or(UNKNOWN)
}

pub fn detect_os(user_agent: &str) -> &'static str {
    classify(OS_RULES, user_agent).unwrap_or(UNKNOWN)
}

/// `"{width}x{height}"`, e.g. `"1920x1080"`.
pub fn screen_resolution(width: u32, height: u32) -> String {
    format!("{}x{}", width, height)
}
