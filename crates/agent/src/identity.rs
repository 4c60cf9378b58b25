use std::time::Instant;

use chavruta_slack::mrkdwn::user_mention;

/// How the bot describes itself in reply to `uptime` and friends.
#[derive(Clone, Debug)]
pub struct Identity {
    bot_name: String,
    hostname: String,
    started: Instant,
}

impl Identity {
    pub fn new(bot_name: impl Into<String>) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "an unknown host".to_owned());
        Self::with_hostname(bot_name, hostname)
    }

    pub fn with_hostname(bot_name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self { bot_name: bot_name.into(), hostname: hostname.into(), started: Instant::now() }
    }

    pub fn reply(&self) -> String {
        identity_reply(&self.bot_name, self.started.elapsed().as_secs(), &self.hostname)
    }
}

pub fn identity_reply(bot_name: &str, uptime_secs: u64, hostname: &str) -> String {
    format!(
        ":robot_face: I am a bot named {}. I have been running for {} on {hostname}.",
        user_mention(bot_name),
        format_uptime(uptime_secs)
    )
}

/// Seconds up to a minute, then minutes up to an hour, then hours. Fractions
/// are kept.
pub fn format_uptime(seconds: u64) -> String {
    let mut value = seconds as f64;
    let mut unit = "second";
    if value > 60.0 {
        value /= 60.0;
        unit = "minute";
    }
    if value > 60.0 {
        value /= 60.0;
        unit = "hour";
    }
    let plural = if value == 1.0 { "" } else { "s" };
    format!("{value} {unit}{plural}")
}
