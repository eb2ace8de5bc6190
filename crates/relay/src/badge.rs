//! Permission level → badge, role color, and the staff bypass rule.

use crate::message::RoleColor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub glyph: &'static str,
    pub rank: &'static str,
}

/// Ascending, exclusive upper bounds. The last band is open-ended.
const BANDS: &[(i64, Badge)] = &[
    (10, Badge {
        glyph: "",
        rank: "User",
    }),
    (100, Badge {
        glyph: "🔧",
        rank: "Server Staff",
    }),
    (1000, Badge {
        glyph: "🔧🧰",
        rank: "Global Admin",
    }),
];

const TOP_BADGE: Badge = Badge {
    glyph: "🔧🧰⚙️",
    rank: "Developer",
};

/// Identity shown on announcements.
pub const SYSTEM_BADGE: Badge = Badge {
    glyph: "📢",
    rank: "Announcement",
};

pub fn badge_for(level: i64) -> Badge {
    BANDS
        .iter()
        .find(|(upper, _)| level < *upper)
        .map(|(_, badge)| *badge)
        .unwrap_or(TOP_BADGE)
}

/// Color of the highest positioned colored role, or `neutral`.
pub fn representative_color(roles: &[RoleColor], neutral: u32) -> u32 {
    roles
        .iter()
        .filter(|r| r.color != 0)
        .max_by_key(|r| r.position)
        .map_or(neutral, |r| r.color)
}

/// Who skips rate limiting and filter blocking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassPolicy {
    pub staff_threshold: i64,
    pub staff_topic: String,
}

impl BypassPolicy {
    pub fn bypasses(&self, level: i64, topic: &str) -> bool {
        level >= self.staff_threshold || topic == self.staff_topic
    }
}
