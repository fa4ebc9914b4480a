use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Clock-reading tools, rendered in one configured timezone.
#[derive(Debug, Clone, Copy)]
pub struct TimeTools {
    tz: Tz,
}

impl TimeTools {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn from_name(name: &str) -> Result<Self, String> {
        name.trim()
            .parse::<Tz>()
            .map(Self::new)
            .map_err(|e| format!("Unknown timezone '{}': {}", name, e))
    }

    pub fn current_time(&self) -> String {
        self.time_at(Utc::now())
    }

    pub fn current_date(&self) -> String {
        self.date_at(Utc::now())
    }

    pub fn current_timezone(&self) -> String {
        self.timezone_at(Utc::now())
    }

    fn local(&self, at: DateTime<Utc>) -> DateTime<Tz> {
        at.with_timezone(&self.tz)
    }

    fn time_at(&self, at: DateTime<Utc>) -> String {
        self.local(at).format("%Y-%m-%d %H:%M:%S %Z").to_string()
    }

    fn date_at(&self, at: DateTime<Utc>) -> String {
        self.local(at).format("%Y-%m-%d").to_string()
    }

    fn timezone_at(&self, at: DateTime<Utc>) -> String {
        format!("{} ({})", self.tz.name(), self.local(at).format("%Z, UTC%:z"))
    }
}
