//! Query functions organized by table.

pub mod addresses;
pub mod draws;
pub mod payments;
pub mod sequences;
pub mod sponsors;
pub mod watermarks;
