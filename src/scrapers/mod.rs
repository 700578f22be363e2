//! Per-site harvesting profiles.
//!
//! Each submodule knows one site's markup and builds the plan that drives it.
//! Sites come in two shapes:
//!
//! 1. **Interactive**: a rendered page with a "load more" control, harvested
//!    round by round through a browser session ([`crate::harvest`])
//! 2. **Paged**: server-rendered pages linked by a "next" anchor, fetched
//!    over plain HTTP ([`crate::paginate`])
//!
//! # Supported Sites
//!
//! | Site | Module | Shape | Output | Notes |
//! |------|--------|-------|--------|-------|
//! | Finam | [`finam`] | Interactive | `finam.csv` | Link-only extraction; dates from URLs |
//! | Interfax | [`interfax`] | Interactive | `interfax.csv` | `div.timeline` blocks |
//! | Vedomosti business | [`vedomosti`] | Interactive | `vedomosti_business.csv` | Two-pass extraction, probe positions |
//! | Vedomosti economics | [`vedomosti`] | Interactive | `vedomosti_economics.csv` | Same layout, `/economics/` links |
//! | AKM | [`akm`] | Paged | `akm.csv` | Free-text dates |

pub mod akm;
pub mod finam;
pub mod interfax;
pub mod vedomosti;

use crate::harvest::HarvestPlan;
use crate::paginate::PaginationPlan;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use vedomosti::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Site {
    Finam,
    Interfax,
    VedomostiBusiness,
    VedomostiEconomics,
    Akm,
}

/// How a site is harvested, with everything needed to do it.
pub enum SiteProfile {
    Interactive(HarvestPlan),
    Paged(PaginationPlan),
}

impl Site {
    pub const ALL: [Site; 5] = [
        Site::Finam,
        Site::Interfax,
        Site::VedomostiBusiness,
        Site::VedomostiEconomics,
        Site::Akm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Site::Finam => "finam",
            Site::Interfax => "interfax",
            Site::VedomostiBusiness => Section::Business.name(),
            Site::VedomostiEconomics => Section::Economics.name(),
            Site::Akm => "akm",
        }
    }

    pub fn output_file(self) -> &'static str {
        match self {
            Site::Finam => finam::OUTPUT_FILE,
            Site::Interfax => interfax::OUTPUT_FILE,
            Site::VedomostiBusiness => Section::Business.output_file(),
            Site::VedomostiEconomics => Section::Economics.output_file(),
            Site::Akm => akm::OUTPUT_FILE,
        }
    }

    /// Default profile for this site, before any settings overrides.
    pub fn profile(self) -> SiteProfile {
        match self {
            Site::Finam => SiteProfile::Interactive(finam::plan()),
            Site::Interfax => SiteProfile::Interactive(interfax::plan()),
            Site::VedomostiBusiness => SiteProfile::Interactive(vedomosti::plan(Section::Business)),
            Site::VedomostiEconomics => SiteProfile::Interactive(vedomosti::plan(Section::Economics)),
            Site::Akm => SiteProfile::Paged(akm::plan()),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
