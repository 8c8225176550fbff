use crate::config::IceServerConfig;
use rand::Rng;

/// Hex-encoded 128-bit random value.
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 16]>())
}

// Добавляет схему `stun:` или `turn:` к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(config: &IceServerConfig) -> String {
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
        || config.url.starts_with("stuns:")
    {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}
