use crate::gazetteer::{self, Place};
use crate::record::LocationData;
use rstar::{Point as RstarPoint, RTree};
use std::path::PathBuf;
use std::sync::OnceLock;

/// A gazetteer entry projected into degree space for the R-tree. Carries
/// the index of its `Place` so the tree stays small.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPlace {
    lat: f64,
    lon: f64,
    place: u32,
}

impl RstarPoint for IndexedPlace {
    type Scalar = f64;
    const DIMENSIONS: usize = 2;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        Self {
            lat: generator(0),
            lon: generator(1),
            place: u32::MAX,
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        match index {
            0 => self.lat,
            1 => self.lon,
            _ => unreachable!(),
        }
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        match index {
            0 => &mut self.lat,
            1 => &mut self.lon,
            _ => unreachable!(),
        }
    }
}

struct GeoIndex {
    places: Vec<Place>,
    tree: RTree<IndexedPlace>,
}

/// Nearest-populated-place lookup over a static gazetteer.
///
/// The index is built once on `initialize` and read-only afterwards, so
/// queries need no locking. A missing or unreadable gazetteer is not
/// fatal: the geocoder stays uninitialized, warns once, and every query
/// returns `None`.
pub struct Geocoder {
    gazetteer_path: Option<PathBuf>,
    minimum_population: u64,
    index: OnceLock<Option<GeoIndex>>,
}

impl Geocoder {
    pub fn new(gazetteer_path: Option<PathBuf>, minimum_population: u64) -> Self {
        Self {
            gazetteer_path,
            minimum_population,
            index: OnceLock::new(),
        }
    }

    /// A geocoder that never resolves anything. Used when no gazetteer is
    /// configured.
    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    /// Builds the spatial index. Idempotent: the second and later calls
    /// are no-ops regardless of whether the first succeeded.
    pub fn initialize(&self) {
        self.index.get_or_init(|| self.build_index());
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.index.get(), Some(Some(_)))
    }

    fn build_index(&self) -> Option<GeoIndex> {
        let path = self.gazetteer_path.as_ref()?;
        let loaded = match gazetteer::load(path) {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::warn!(
                    "geocoding disabled, could not load gazetteer {}: {err:#}",
                    path.display()
                );
                return None;
            }
        };

        let mut places = Vec::new();
        let mut points = Vec::new();
        for place in loaded.places {
            if place.population < self.minimum_population {
                continue;
            }
            points.push(IndexedPlace {
                lat: place.latitude,
                lon: place.longitude,
                place: places.len() as u32,
            });
            places.push(place);
        }

        tracing::debug!(
            "geocoder index ready: {} places (min population {})",
            places.len(),
            self.minimum_population
        );
        Some(GeoIndex {
            places,
            tree: RTree::bulk_load(points),
        })
    }

    /// Returns the nearest admitted place for the coordinates, or `None`
    /// when the index is empty or was never initialized. Distance is
    /// Euclidean in degree space; there is no radius cap, so ocean
    /// coordinates resolve to the nearest coast.
    pub fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Option<LocationData> {
        let index = self.index.get()?.as_ref()?;
        let query = IndexedPlace {
            lat: latitude,
            lon: longitude,
            place: u32::MAX,
        };
        let nearest = index.tree.nearest_neighbor(&query)?;
        let place = &index.places[nearest.place as usize];
        Some(LocationData {
            city: place.name.clone(),
            district: non_empty(&place.admin2),
            state: non_empty(&place.admin1),
            country: non_empty(&place.country),
            population: place.population,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
