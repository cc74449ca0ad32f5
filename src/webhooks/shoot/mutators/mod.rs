//! Defaulting steps applied to Shoots, in the order the webhook runs them.

pub mod kubernetes_version;
pub mod machine_image;
pub mod networking;
pub mod tasks;
