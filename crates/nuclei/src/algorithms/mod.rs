pub mod extraction;
pub mod seeds;
pub mod stain;
pub mod tiling;
pub mod watershed;
pub mod zone;

pub use extraction::*;
pub use seeds::*;
pub use stain::*;
pub use tiling::*;
pub use watershed::*;
pub use zone::*;
