//! Built-in rule text used when nothing has been saved yet

const DEFAULT_CONFIG: &str = "\
# SysBlock Config
# Add line below to lock uninstall:
# PREVENT_UNINSTALL

SET | MASTER_SWITCH | true

# Session Times (Minutes)
# SET | SESSION_TIME | 5 | 10 | 20 | 30

# App Rules (Time: 0 = Instant Block, 30m = 30 Minutes)
# SET | APPLOCK | com.facebook.katana | 45m
# SET | APPLOCK | com.instagram.android | 20m";

/// Template rule text with every directive shown commented out
pub fn default_config_text() -> &'static str {
    DEFAULT_CONFIG
}
