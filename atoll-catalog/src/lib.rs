pub mod package;
pub mod pricing;

pub use package::{Catalog, PackageRef, TravelPackage};
