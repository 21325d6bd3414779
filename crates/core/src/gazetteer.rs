use crate::constants::GEO_INDEX_SUFFIX;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const SIDECAR_MAGIC: u32 = 0x4745_4f49; // "GEOI"
const SIDECAR_VERSION: u32 = 1;

/// One admitted populated place from the gazetteer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
    pub admin1: String,
    pub admin2: String,
    pub population: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    magic: u32,
    version: u32,
    places: Vec<Place>,
}

#[derive(Debug)]
pub struct LoadedGazetteer {
    pub places: Vec<Place>,
    /// Lines that failed to parse and were skipped.
    pub skipped_lines: u64,
}

/// Loads every populated place from a GeoNames-layout file, preferring the
/// binary sidecar when it is present and not older than the text file.
/// The sidecar holds all admitted places; population thresholds are
/// applied later at index build, so one sidecar serves any configuration.
pub fn load(path: &Path) -> Result<LoadedGazetteer> {
    let sidecar = sidecar_path(path);
    if sidecar_is_fresh(path, &sidecar) {
        match load_sidecar(&sidecar) {
            Ok(places) => {
                tracing::debug!(
                    "loaded {} places from sidecar {}",
                    places.len(),
                    sidecar.display()
                );
                return Ok(LoadedGazetteer {
                    places,
                    skipped_lines: 0,
                });
            }
            Err(err) => {
                tracing::warn!(
                    "ignoring unreadable gazetteer sidecar {}: {err:#}",
                    sidecar.display()
                );
            }
        }
    }

    let loaded = parse_tab_separated(path)?;
    if let Err(err) = write_sidecar(&sidecar, &loaded.places) {
        // The sidecar is purely a reload accelerator.
        tracing::warn!(
            "could not write gazetteer sidecar {}: {err:#}",
            sidecar.display()
        );
    }
    Ok(loaded)
}

pub fn sidecar_path(gazetteer: &Path) -> PathBuf {
    let mut name = gazetteer.as_os_str().to_os_string();
    name.push(".");
    name.push(GEO_INDEX_SUFFIX);
    PathBuf::from(name)
}

fn sidecar_is_fresh(gazetteer: &Path, sidecar: &Path) -> bool {
    let Ok(sidecar_meta) = std::fs::metadata(sidecar) else {
        return false;
    };
    let Ok(source_meta) = std::fs::metadata(gazetteer) else {
        return false;
    };
    match (sidecar_meta.modified(), source_meta.modified()) {
        (Ok(sidecar_time), Ok(source_time)) => sidecar_time >= source_time,
        _ => false,
    }
}

/// GeoNames tab-separated layout: 0=id, 1=name, 4=lat, 5=lon,
/// 6=featureClass, 8=country, 10=admin1, 11=admin2, 14=population.
/// Only feature class "P" (populated place) is admitted. Malformed lines
/// are counted and skipped; no line aborts the load.
fn parse_tab_separated(path: &Path) -> Result<LoadedGazetteer> {
    let file = File::open(path)
        .with_context(|| format!("failed to open gazetteer: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut places = Vec::new();
    let mut skipped = 0u64;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        match parse_line(&line) {
            LineResult::Admitted(place) => places.push(place),
            LineResult::NotPopulatedPlace => {}
            LineResult::Malformed => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            "skipped {skipped} malformed gazetteer lines in {}",
            path.display()
        );
    }
    tracing::debug!("parsed {} populated places from {}", places.len(), path.display());

    Ok(LoadedGazetteer {
        places,
        skipped_lines: skipped,
    })
}

enum LineResult {
    Admitted(Place),
    NotPopulatedPlace,
    Malformed,
}

fn parse_line(line: &str) -> LineResult {
    if line.is_empty() {
        return LineResult::Malformed;
    }
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() < 15 {
        return LineResult::Malformed;
    }
    if columns[6] != "P" {
        return LineResult::NotPopulatedPlace;
    }

    let name = columns[1].trim();
    if name.is_empty() {
        return LineResult::Malformed;
    }
    let (Ok(latitude), Ok(longitude)) = (columns[4].parse::<f64>(), columns[5].parse::<f64>())
    else {
        return LineResult::Malformed;
    };
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return LineResult::Malformed;
    }

    // Empty population cells are common and mean "unknown"; treat as zero.
    let population = columns[14].trim().parse::<u64>().unwrap_or(0);

    LineResult::Admitted(Place {
        name: name.to_string(),
        latitude,
        longitude,
        country: columns[8].trim().to_string(),
        admin1: columns[10].trim().to_string(),
        admin2: columns[11].trim().to_string(),
        population,
    })
}

fn load_sidecar(path: &Path) -> Result<Vec<Place>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open sidecar: {}", path.display()))?;
    let sidecar: Sidecar = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("failed to decode sidecar: {}", path.display()))?;
    if sidecar.magic != SIDECAR_MAGIC || sidecar.version != SIDECAR_VERSION {
        anyhow::bail!("sidecar has unknown format: {}", path.display());
    }
    Ok(sidecar.places)
}

fn write_sidecar(path: &Path, places: &[Place]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("sidecar path has no parent: {}", path.display()))?;
    let temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp sidecar in {}", parent.display()))?;

    let sidecar = Sidecar {
        magic: SIDECAR_MAGIC,
        version: SIDECAR_VERSION,
        places: places.to_vec(),
    };
    let mut writer = BufWriter::new(temp.as_file());
    bincode::serialize_into(&mut writer, &sidecar)
        .with_context(|| format!("failed to encode sidecar: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush sidecar: {}", path.display()))?;
    drop(writer);
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync sidecar: {}", path.display()))?;
    temp.persist(path)
        .with_context(|| format!("failed to persist sidecar: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    pub(crate) fn gazetteer_line(
        id: u32,
        name: &str,
        lat: f64,
        lon: f64,
        class: &str,
        country: &str,
        admin1: &str,
        admin2: &str,
        population: u64,
    ) -> String {
        format!(
            "{id}\t{name}\t{name}\t\t{lat}\t{lon}\t{class}\tPPL\t{country}\t\t{admin1}\t{admin2}\t\t\t{population}\t\t\t\tEurope/Lisbon\t2024-01-01"
        )
    }

    #[test]
    fn parses_populated_places_only() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("allCountries.txt");
        let body = [
            gazetteer_line(1, "Lisbon", 38.71667, -9.13333, "P", "PT", "14", "1106", 517_802),
            gazetteer_line(2, "Tagus", 39.0, -8.0, "H", "PT", "", "", 0),
            gazetteer_line(3, "Porto", 41.14961, -8.61099, "P", "PT", "13", "1312", 237_591),
        ]
        .join("\n");
        fs::write(&path, body).expect("write");

        let loaded = load(&path).expect("load");
        assert_eq!(loaded.places.len(), 2);
        assert_eq!(loaded.skipped_lines, 0);
        assert_eq!(loaded.places[0].name, "Lisbon");
        assert_eq!(loaded.places[0].country, "PT");
        assert_eq!(loaded.places[0].admin2, "1106");
        assert_eq!(loaded.places[0].population, 517_802);
    }

    #[test]
    fn malformed_lines_are_counted_not_fatal() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("allCountries.txt");
        let body = [
            "garbage line without tabs".to_string(),
            gazetteer_line(1, "Lisbon", 38.71667, -9.13333, "P", "PT", "14", "1106", 517_802),
            "1\tshort\tline".to_string(),
            gazetteer_line(2, "BadLat", 999.0, 0.0, "P", "PT", "", "", 10),
        ]
        .join("\n");
        fs::write(&path, body).expect("write");

        let loaded = load(&path).expect("load");
        assert_eq!(loaded.places.len(), 1);
        assert_eq!(loaded.skipped_lines, 3);
    }

    #[test]
    fn empty_population_defaults_to_zero() {
        let line = "9\tHamlet\tHamlet\t\t1.0\t2.0\tP\tPPL\tFR\t\t\t\t\t\t\t\t\t\t\t2024-01-01";
        match parse_line(line) {
            LineResult::Admitted(place) => assert_eq!(place.population, 0),
            _ => panic!("line should be admitted"),
        }
    }

    #[test]
    fn sidecar_round_trip_and_reuse() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("allCountries.txt");
        fs::write(
            &path,
            gazetteer_line(1, "Lisbon", 38.71667, -9.13333, "P", "PT", "14", "1106", 517_802),
        )
        .expect("write");

        let first = load(&path).expect("first load");
        let sidecar = sidecar_path(&path);
        assert!(sidecar.exists(), "sidecar should be written");

        // Corrupt detection: the second load must come from the sidecar and
        // match the parsed data exactly.
        let second = load(&path).expect("second load");
        assert_eq!(first.places, second.places);
    }

    #[test]
    fn stale_sidecar_is_rebuilt() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("allCountries.txt");
        fs::write(
            &path,
            gazetteer_line(1, "Lisbon", 38.7, -9.1, "P", "PT", "14", "1106", 100),
        )
        .expect("write");
        let _ = load(&path).expect("initial load");

        // Make the source newer than the sidecar.
        fs::write(
            &path,
            [
                gazetteer_line(1, "Lisbon", 38.7, -9.1, "P", "PT", "14", "1106", 100),
                gazetteer_line(2, "Porto", 41.1, -8.6, "P", "PT", "13", "1312", 200),
            ]
            .join("\n"),
        )
        .expect("rewrite");
        let sidecar = sidecar_path(&path);
        let old = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&sidecar, old).expect("set mtime");

        let reloaded = load(&path).expect("reload");
        assert_eq!(reloaded.places.len(), 2);
    }
}
