//! Optional YAML settings that tune the per-site defaults.
//!
//! Every site starts from the tunables in its profile. A settings file can
//! override any subset of them, keyed by site name:
//!
//! ```yaml
//! harvest:
//!   finam:
//!     target_count: 500
//!     max_rounds: 20
//!   vedomosti-business:
//!     probe_fractions: [0.9, 0.6]
//! pagination:
//!   akm:
//!     max_pages: 10
//! ```
//!
//! Fields that are not mentioned keep the site's own default, not the global
//! one, so overriding `max_rounds` for finam leaves its 3000-item target alone.

use crate::scrapers::{Site, SiteProfile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::error::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Per-site overrides of [`crate::harvest::HarvestConfig`].
    pub harvest: BTreeMap<Site, Mapping>,
    /// Per-site overrides of [`crate::paginate::PaginationConfig`].
    pub pagination: BTreeMap<Site, Mapping>,
}

impl Settings {
    /// Read settings from a YAML file.
    #[instrument(level = "info")]
    pub async fn load(path: &str) -> Result<Self, Box<dyn Error>> {
        let text = fs::read_to_string(path).await?;
        let settings = Self::from_yaml(&text)?;
        info!(
            harvest_sites = settings.harvest.len(),
            pagination_sites = settings.pagination.len(),
            "Loaded settings"
        );
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document parses as null rather than an empty mapping.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Apply the overrides for `site` to its profile.
    ///
    /// Fails when an override names an unknown field, has the wrong type, or
    /// targets the wrong kind of harvester for the site.
    pub fn apply(&self, site: Site, profile: &mut SiteProfile) -> Result<(), Box<dyn Error>> {
        match profile {
            SiteProfile::Interactive(plan) => {
                if self.pagination.contains_key(&site) {
                    return Err(format!("{site} is not paginated; move its settings under `harvest`").into());
                }
                if let Some(overrides) = self.harvest.get(&site) {
                    plan.config = overlay(&plan.config, overrides)?;
                    debug!(%site, config = ?plan.config, "Applied harvest overrides");
                }
            }
            SiteProfile::Paged(plan) => {
                if self.harvest.contains_key(&site) {
                    return Err(format!("{site} is paginated; move its settings under `pagination`").into());
                }
                if let Some(overrides) = self.pagination.get(&site) {
                    plan.config = overlay(&plan.config, overrides)?;
                    debug!(%site, config = ?plan.config, "Applied pagination overrides");
                }
            }
        }
        Ok(())
    }
}

/// `base` with the keys of `overrides` replaced.
fn overlay<T>(base: &T, overrides: &Mapping) -> Result<T, serde_yaml::Error>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_yaml::to_value(base)?;
    if let Value::Mapping(fields) = &mut value {
        for (key, override_value) in overrides {
            fields.insert(key.clone(), override_value.clone());
        }
    }
    serde_yaml::from_value(value)
}
