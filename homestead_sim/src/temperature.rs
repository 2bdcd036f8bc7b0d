// Seasonal temperature.
//
// A pure sinusoid over the day of the year: coldest at the year's start,
// a 10 °C mean with a 25 °C amplitude. The driver samples it once per day
// and stores it on the grid; snapshots carry it for the renderer.

use std::f64::consts::TAU;

/// Temperature in °C for a day of the year.
pub fn temperature_for_day(day_of_year: u32, days_per_year: u32) -> f64 {
    let phase = day_of_year as f64 / days_per_year.max(1) as f64;
    10.0 - 25.0 * (TAU * phase).cos()
}
