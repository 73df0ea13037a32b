// ── Latest-value sensor store ──
//
// Lock-free keyed storage of the most recent reading per sensor.

mod sensor_store;

pub use sensor_store::SensorStore;
