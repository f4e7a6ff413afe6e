use chrono::{DateTime, Utc};

/// One lighting frame observation as delivered by the WFS feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub gml_id: String,
    pub slm_id: String,
    pub smid: String,
    pub smcislo: String,
    pub aktivne: String,
    pub position_lat: String,
    pub position_lon: String,
    pub scrap_time: String, // ISO-8601 UTC, whole seconds
}

impl Record {
    /// Column names of the `data` table, in insertion order.
    pub const COLUMNS: [&'static str; 8] = [
        "gml_id",
        "slm_id",
        "smid",
        "smcislo",
        "aktivne",
        "position_lat",
        "position_lon",
        "scrap_time",
    ];

    /// Columns forming the natural key used for upserts.
    pub const KEY_COLUMNS: [&'static str; 3] = ["gml_id", "slm_id", "smcislo"];

    /// Values in the same order as [`Record::COLUMNS`].
    pub fn values(&self) -> [&str; 8] {
        [
            self.gml_id.as_str(),
            self.slm_id.as_str(),
            self.smid.as_str(),
            self.smcislo.as_str(),
            self.aktivne.as_str(),
            self.position_lat.as_str(),
            self.position_lon.as_str(),
            self.scrap_time.as_str(),
        ]
    }
}

/// Persisted state carried from one run to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub last_run: Option<DateTime<Utc>>,
}

impl RunState {
    /// Interprets the raw stored `last_run` value. An unreadable value is a
    /// configuration error, never a reason to run again silently.
    pub fn from_stored(raw: Option<&str>) -> crate::error::Result<Self> {
        let Some(value) = raw else {
            return Ok(Self::default());
        };
        let last_run = crate::utils::parse_timestamp(value).map_err(|reason| {
            crate::error::Error::InvalidLastRun {
                value: value.to_string(),
                reason,
            }
        })?;
        Ok(Self {
            last_run: Some(last_run),
        })
    }

    pub fn finished_at(now: DateTime<Utc>) -> Self {
        Self {
            last_run: Some(crate::utils::truncate_to_seconds(now)),
        }
    }
}

/// Query rectangle in decimal degrees (WGS 84).
///
/// Coordinates are kept as text so the request body carries exactly what was
/// configured, without float formatting round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub west: &'static str,
    pub south: &'static str,
    pub east: &'static str,
    pub north: &'static str,
}

impl BoundingBox {
    /// Whole target region: the city of Bratislava.
    pub const BRATISLAVA: BoundingBox = BoundingBox {
        west: "16.9400",
        south: "48.0000",
        east: "17.3500",
        north: "48.2700",
    };

    /// Old Town only, for partial runs against the live service.
    pub const STARE_MESTO: BoundingBox = BoundingBox {
        west: "17.0900",
        south: "48.1350",
        east: "17.1300",
        north: "48.1600",
    };
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::BRATISLAVA
    }
}
