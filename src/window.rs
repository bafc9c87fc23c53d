use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

/// Fixed window size in compact suffix notation ("30s", "5m", "1h", "2d", "1w").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    seconds: i64,
}

impl WindowSpec {
    pub fn from_secs(seconds: i64) -> Self {
        assert!(seconds > 0, "window must be positive");
        Self { seconds }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.seconds)
    }
}

impl FromStr for WindowSpec {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() < 2 || !s.is_ascii() {
            return Err("expected <number><unit>, e.g. 5m".into());
        }
        let (num, unit) = s.split_at(s.len() - 1);
        let n: i64 = num.parse().map_err(|_| format!("invalid number '{num}'"))?;
        if n <= 0 {
            return Err("window must be positive".into());
        }
        let mult = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            _ => return Err(format!("unknown unit '{unit}', expected s/m/h/d/w")),
        };
        Ok(Self { seconds: n * mult })
    }
}

/// Half-open time window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

/// Tile `[since, until)` with windows of `step`. Successive windows touch with
/// no gap or overlap; the final window is clipped to `until`.
pub fn tile(
    since: OffsetDateTime,
    until: OffsetDateTime,
    step: WindowSpec,
) -> impl Iterator<Item = Window> {
    let step = step.duration();
    let mut current = since;
    std::iter::from_fn(move || {
        if current >= until {
            return None;
        }
        let end = (current + step).min(until);
        let window = Window { start: current, end };
        current = end;
        Some(window)
    })
}
