use chrono::{NaiveDate, NaiveDateTime};
use urlencoding::encode;

use crate::types::{LocationId, MapId};

/// Inputs of a booking deep link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingLink {
    /// Leaf map node listing the resource
    pub map_id: MapId,
    /// Arrival date
    pub start_date: NaiveDate,
    /// Departure date
    pub end_date: NaiveDate,
    /// Sub-equipment category id
    pub equipment: i64,
    /// Owning location, appended when known
    pub location_id: Option<LocationId>,
}

/// Build the deep link into the platform's booking results page.
///
/// The output depends only on its arguments. `search_time` is the one
/// component that varies between runs: the platform expects the time the
/// search was made, so callers pass the run's start time.
pub fn booking_url(base_url: &str, link: &BookingLink, search_time: NaiveDateTime) -> String {
    let nights = (link.end_date - link.start_date).num_days();

    let mut url = format!(
        "{}/create-booking/results?mapId={}&searchTabGroupId=0&bookingCategoryId=0\
         &startDate={}&endDate={}&nights={}&isReserving=true&equipmentId=-32768\
         &subEquipmentId={}&peopleCapacityCategoryCounts={}&searchTime={}\
         &flexibleSearch={}&filterData={}",
        base_url.trim_end_matches('/'),
        link.map_id,
        link.start_date.format("%Y-%m-%d"),
        link.end_date.format("%Y-%m-%d"),
        nights,
        link.equipment,
        encode("[[-32767,null,1,null]]"),
        encode(&search_time.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
        encode("[false,false,null,1]"),
        encode(r#"{"-32756":"[[1],0,0,0]"}"#),
    );

    if let Some(location_id) = link.location_id {
        url.push_str(&format!("&resourceLocationId={}", location_id));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> BookingLink {
        BookingLink {
            map_id: -2147483400,
            start_date: NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 7, 12).unwrap(),
            equipment: -32759,
            location_id: Some(-2147483590),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_milli_opt(h, m, s, 250)
            .unwrap()
    }

    #[test]
    fn test_identical_inputs_identical_url() {
        let time = at(6, 30, 0);
        assert_eq!(
            booking_url("https://reservation.pc.gc.ca", &link(), time),
            booking_url("https://reservation.pc.gc.ca/", &link(), time)
        );
    }

    #[test]
    fn test_only_search_time_varies() {
        let first = booking_url("https://reservation.pc.gc.ca", &link(), at(6, 30, 0));
        let second = booking_url("https://reservation.pc.gc.ca", &link(), at(7, 45, 10));
        assert_ne!(first, second);

        let strip = |url: &str| {
            url.split('&')
                .filter(|part| !part.starts_with("searchTime="))
                .collect::<Vec<_>>()
                .join("&")
        };
        assert_eq!(strip(&first), strip(&second));
    }

    #[test]
    fn test_url_contents() {
        let url = booking_url("https://reservation.pc.gc.ca", &link(), at(6, 30, 0));
        assert!(url.starts_with("https://reservation.pc.gc.ca/create-booking/results?mapId=-2147483400&"));
        assert!(url.contains("&startDate=2025-07-07&endDate=2025-07-12&nights=5&"));
        assert!(url.contains("&subEquipmentId=-32759&"));
        assert!(url.contains("&searchTime=2025-07-01T06%3A30%3A00.250&"));
        assert!(url.ends_with("&resourceLocationId=-2147483590"));

        let without_location = BookingLink {
            location_id: None,
            ..link()
        };
        let url = booking_url("https://reservation.pc.gc.ca", &without_location, at(6, 30, 0));
        assert!(!url.contains("resourceLocationId"));
    }
}
