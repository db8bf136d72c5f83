//! Cities the catalog starts out with.

use crate::model::{City, Coordinates};

/// `(name, lon, lat)`
pub const DEFAULT_CITIES: &[(&str, f64, f64)] = &[
    ("New York", -74.0060, 40.7128),
    ("Los Angeles", -118.2437, 34.0522),
    ("London", -0.1276, 51.5074),
    ("Paris", 2.3522, 48.8566),
    ("Tokyo", 139.6917, 35.6895),
    ("Shanghai", 121.4737, 31.2304),
    ("Moscow", 37.6173, 55.7558),
    ("Mumbai", 72.8777, 19.0760),
    ("Rio de Janeiro", -43.1729, -22.9068),
    ("Sydney", 151.2093, -33.8688),
    ("Cairo", 31.2357, 30.0444),
    ("Buenos Aires", -58.3816, -34.6037),
    ("Toronto", -79.3832, 43.6532),
    ("Mexico City", -99.1332, 19.4326),
    ("Dubai", 55.2708, 25.2048),
    ("Johannesburg", 28.0473, -26.2041),
    ("Singapore", 103.8198, 1.3521),
    ("Hong Kong", 114.1694, 22.3193),
    ("Berlin", 13.4050, 52.5200),
    ("Rome", 12.4964, 41.9028),
    ("Seoul", 126.9780, 37.5665),
    ("Bangkok", 100.5018, 13.7563),
    ("Istanbul", 28.9784, 41.0082),
    ("Lagos", 3.3792, 6.5244),
    ("Jakarta", 106.8456, -6.2088),
    ("Madrid", -3.7038, 40.4168),
    ("Beijing", 116.4074, 39.9042),
    ("Sao Paulo", -46.6333, -23.5505),
    ("Chicago", -87.6298, 41.8781),
    ("San Francisco", -122.4194, 37.7749),
];

pub fn default_cities() -> impl Iterator<Item = City> {
    DEFAULT_CITIES
        .iter()
        .map(|&(name, lon, lat)| City::new(name, Coordinates { lon, lat }))
}
