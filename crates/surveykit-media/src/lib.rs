pub mod imgbb;

pub use imgbb::{ImgbbClient, UploadedImage};
