use std::collections::HashMap;

use crate::config::MeterConfig;
use crate::models::AmrProtocol;

/// Unconfigured meters are always published. Configured ones only with their
/// own protocol, some meters send more than one protocol and some ids collide.
pub fn should_publish(meters: &HashMap<String, MeterConfig>, meter_id: &str, observed: AmrProtocol) -> bool {
    match meters.get(meter_id) {
        Some(meter) => meter.protocol == observed,
        None => true,
    }
}
