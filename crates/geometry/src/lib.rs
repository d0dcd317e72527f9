#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! Point cloud primitives shared by the submap engine: a typed point cloud
//! with optional normals and colors, a voxel-lattice key, and a k-d tree
//! supporting nearest/k-nearest/radius queries. Usable on its own, or
//! through the `submap-engine` crate.

#[doc = "A typed 3D point cloud with optional normal and color attributes."]
pub mod point_cloud;

#[doc = "A k-d tree over 3D points, supporting nearest, k-nearest and radius queries."]
pub mod kd_tree;

#[doc = "The integer voxel-lattice key addressing used by every voxel structure in this workspace."]
pub mod voxel_key;

#[doc = "Small numeric helpers shared across point cloud and feature computations."]
pub mod numeric;

pub use kd_tree::KdTree;
pub use point_cloud::PointCloud;
pub use voxel_key::VoxelKey;
