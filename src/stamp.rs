//! Timestamp suffixes of snapshot and archive names.
//!
//! Configs carry strftime-style formats (`%Y_%m_%d__%H_%M_%S`). They are
//! translated once into a `time` format description; a format without any
//! `%` is taken to already be in `time`'s bracket syntax.

use anyhow::{Context, Result, anyhow};
use time::format_description::{self, FormatItem, OwnedFormatItem};
use time::macros::{datetime, format_description};
use time::parsing::Parsed;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

const ISO_TIMESTAMP: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

#[derive(Clone, Debug)]
pub struct StampFormat {
    source: String,
    items: OwnedFormatItem,
}

impl StampFormat {
    pub fn new(pattern: &str) -> Result<Self> {
        let description = if pattern.contains('%') {
            translate_strftime(pattern)?
        } else {
            pattern.to_string()
        };
        let items = format_description::parse_owned::<1>(&description)
            .with_context(|| format!("invalid format description {:?}", description))?;
        Ok(Self {
            source: pattern.to_string(),
            items,
        })
    }

    pub fn format(&self, dt: PrimitiveDateTime) -> Result<String> {
        dt.format(&self.items)
            .with_context(|| format!("format {} with {:?}", dt, self.source))
    }

    /// Parses a suffix. Formats without a time of day yield midnight; a
    /// two-digit year lands in 1969..=2068.
    pub fn parse(&self, suffix: &str) -> Result<PrimitiveDateTime> {
        let context = || format!("parse {:?} with format {:?}", suffix, self.source);
        let mut parsed = Parsed::new();
        let rest = parsed
            .parse_item(suffix.as_bytes(), &self.items)
            .with_context(context)?;
        if !rest.is_empty() {
            return Err(anyhow!("{}: unexpected trailing characters", context()));
        }
        if parsed.year().is_none()
            && let Some(last_two) = parsed.year_last_two()
        {
            parsed
                .set_year(expand_two_digit_year(last_two))
                .ok_or_else(|| anyhow!("{}: year out of range", context()))?;
        }

        if has_time_of_day(&parsed) {
            PrimitiveDateTime::try_from(parsed).with_context(context)
        } else {
            Ok(Date::try_from(parsed).with_context(context)?.midnight())
        }
    }

    /// Checks that a rendered timestamp parses back to the same instant, so
    /// distinct snapshots never collapse onto one key.
    pub fn check_roundtrip(&self) -> Result<()> {
        let sample = datetime!(2001-02-03 16:05:06);
        let rendered = self.format(sample)?;
        let parsed = self.parse(&rendered)?;
        let rerendered = self.format(parsed)?;
        if parsed.date() != sample.date() || rerendered != rendered {
            return Err(anyhow!(
                "format {:?} does not round-trip ({:?} parsed as {})",
                self.source,
                rendered,
                parsed
            ));
        }
        Ok(())
    }
}

fn has_time_of_day(parsed: &Parsed) -> bool {
    parsed.hour_24().is_some()
        || parsed.hour_12().is_some()
        || parsed.hour_12_is_pm().is_some()
        || parsed.minute().is_some()
        || parsed.second().is_some()
}

fn expand_two_digit_year(last_two: u8) -> i32 {
    let last_two = i32::from(last_two);
    if last_two < 69 {
        2000 + last_two
    } else {
        1900 + last_two
    }
}

/// Rendering used for `borg create --timestamp`.
pub fn iso_timestamp(dt: PrimitiveDateTime) -> Result<String> {
    dt.format(ISO_TIMESTAMP).context("format iso timestamp")
}

/// Wall-clock time in the local zone, falling back to UTC when the local
/// offset cannot be determined.
pub fn now_local() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|err| {
        log::warn!("local time offset unavailable ({}), using UTC", err);
        OffsetDateTime::now_utc()
    });
    PrimitiveDateTime::new(now.date(), now.time())
}

fn translate_strftime(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let directive = chars
                    .next()
                    .ok_or_else(|| anyhow!("dangling '%' at end of {:?}", pattern))?;
                let item = match directive {
                    'Y' => "[year]",
                    'y' => "[year repr:last_two]",
                    'm' => "[month]",
                    'd' => "[day]",
                    'j' => "[ordinal]",
                    'H' => "[hour]",
                    'I' => "[hour repr:12]",
                    'p' => "[period]",
                    'M' => "[minute]",
                    'S' => "[second]",
                    'b' => "[month repr:short]",
                    'B' => "[month repr:long]",
                    'a' => "[weekday repr:short]",
                    'A' => "[weekday repr:long]",
                    '%' => "%",
                    other => {
                        return Err(anyhow!("unsupported strftime directive %{}", other));
                    }
                };
                out.push_str(item);
            }
            '[' => out.push_str("[["),
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "tests/stamp_tests.rs"]
mod tests;
