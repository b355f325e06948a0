use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Regular-session hours for the exchange the watchlist tracks.
pub struct MarketHours {
    /// Session open, minutes after local midnight (570 = 9:30am)
    pub open_minute: u32,
    /// Session close, minutes after local midnight (960 = 4:00pm)
    pub close_minute: u32,
    /// IANA timezone of the exchange
    pub timezone: &'static str,
    /// Weekends always count as after-hours when true
    pub weekdays_only: bool,
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            open_minute: 9 * 60 + 30,  // 9:30 AM
            close_minute: 16 * 60,     // 4:00 PM
            timezone: "America/New_York",
            weekdays_only: true,
        }
    }
}

impl MarketHours {
    /// Whether the regular session is open at the given instant.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let tz: Tz = match self.timezone.parse() {
            Ok(tz) => tz,
            Err(e) => {
                tracing::warn!("Failed to parse timezone '{}': {}", self.timezone, e);
                return false; // Default to after-hours if timezone parsing fails
            }
        };

        let local = at.with_timezone(&tz);

        if self.weekdays_only {
            match local.weekday() {
                Weekday::Sat | Weekday::Sun => return false,
                _ => {}
            }
        }

        let minute_of_day = local.hour() * 60 + local.minute();
        minute_of_day >= self.open_minute && minute_of_day < self.close_minute
    }
}

/// Check if the market is open right now, using the default NYSE session.
pub fn is_market_open() -> bool {
    MarketHours::default().is_open_at(Utc::now())
}
