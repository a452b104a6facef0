const EARTH_RADIUS_KM: f64 = 6371.0;

/// An airport an aircraft can be based at, ferried to, or stored at.
#[derive(Clone, Debug, PartialEq)]
pub struct Airport {
    pub iata_code: String,
    pub country: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Airport {
    pub fn new(iata_code: &str, country: &str, name: &str, latitude: f64, longitude: f64) -> Self {
        Airport {
            iata_code: iata_code.to_string(),
            country: country.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Airport) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}
