//! Output writers for harvested items.
//!
//! # Submodules
//!
//! - [`csv`]: Writes one site's items to a `date,title` CSV file
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── finam.csv
//! ├── interfax.csv
//! ├── vedomosti_business.csv
//! ├── vedomosti_economics.csv
//! └── akm.csv
//! ```

pub mod csv;
