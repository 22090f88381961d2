//! Output file naming

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Prefix of every trimmed file
pub const OUTPUT_PREFIX: &str = "trimmed_";

/// How output names are made unique
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingScheme {
    /// `trimmed_<YYYYmmddHHMMSS>.ext`, numbered when the name is taken
    #[default]
    Timestamp,
    /// `trimmed_<YYYYmmddHHMMSS>_<random>.ext`
    TimestampRandom,
}

/// Base file name for a clip finished at `now`
pub fn output_file_name<Tz: TimeZone>(now: &DateTime<Tz>, extension: &str, scheme: NamingScheme) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = now.format("%Y%m%d%H%M%S");
    match scheme {
        NamingScheme::Timestamp => format!("{}{}{}", OUTPUT_PREFIX, stamp, extension),
        NamingScheme::TimestampRandom => {
            let random = Uuid::new_v4().simple().to_string();
            format!("{}{}_{}{}", OUTPUT_PREFIX, stamp, &random[..8], extension)
        }
    }
}

/// Pick an output path in `dir` that does not exist yet.
///
/// The first candidate is the plain name; taken names get `_1`, `_2`, ...
/// inserted before the extension.
pub fn unique_output_path<Tz: TimeZone>(
    dir: &Path,
    now: &DateTime<Tz>,
    extension: &str,
    scheme: NamingScheme,
) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    let name = output_file_name(now, extension, scheme);
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = name.strip_suffix(extension).unwrap_or(&name).to_string();
    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            tracing::debug!("Output name {} taken, using {}", name, candidate.display());
            return candidate;
        }
        counter += 1;
    }
}
