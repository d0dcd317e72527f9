#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! A submap engine for a LiDAR SLAM pipeline: scan integration into a
//! cropped working map, a dense voxel map for visualization/export, a
//! sparse voxel index for fast spatial adjacency queries, ray-based space
//! carving to drop stale geometry, and a place-recognition feature
//! extractor. Orchestrated by [`submap::Submap`].

#[doc = "The error type returned by fallible, caller-correctable operations."]
pub mod error;

#[doc = "Cropping volumes (box/cylinder/sphere/max-radius) used to bound a working map around the sensor."]
pub mod cropping;

#[doc = "A running-mean voxel grid used for the dense map and as a space-carving target."]
pub mod dense_voxel_cloud;

#[doc = "A layered sparse voxel index supporting 26-neighborhood adjacency queries."]
pub mod voxel_index;

#[doc = "Ray-based space carving over point clouds and voxel grids."]
pub mod space_carving;

#[doc = "FPFH-family place-recognition feature extraction."]
pub mod feature_extractor;

#[doc = "Configuration types for the submap engine, including a value-returning builder."]
pub mod parameters;

#[doc = "The `Submap` orchestrator tying every other module together."]
pub mod submap;

pub use cropping::{CropperKind, CroppingVolume};
pub use dense_voxel_cloud::{VoxelBucket, VoxelizedCloud};
pub use error::{SubmapError, SubmapResult};
pub use feature_extractor::FeatureSet;
pub use parameters::{MapperParameters, MapperParametersBuilder};
pub use space_carving::{CarveTimer, CarvingParameters};
pub use submap::Submap;
pub use voxel_index::VoxelMap;
