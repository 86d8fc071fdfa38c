pub mod exe;
pub mod findmnt;
pub mod lsblk;

pub(crate) mod crate_private {
    pub trait Sealed {}
}
