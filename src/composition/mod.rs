//! Stacking layers into sections and concatenating sections into a timeline.
//!
//! ```
//! use saavy_cycles::composition::{Layer, Section, Timeline};
//!
//! let intro = Section::stack(vec![
//!     Layer::sound("bd*4").unwrap().gain(1.2),
//!     Layer::sound("hh*8").unwrap().gain(0.6),
//! ]);
//! let drop = Section::stack(vec![Layer::sound("bd*4 ~ sn").unwrap()]);
//! let song = Timeline::cat([intro.clone(), intro, drop]);
//!
//! assert_eq!(song.length().to_f64(), 3.0);
//! ```

mod layer;
mod section;
mod timeline;

pub use layer::{Layer, LayerKind};
pub use section::Section;
pub use timeline::Timeline;
