//! Hand-rolled stand-ins for the handful of `ash::vk` flag/enum types the
//! sync engine touches, used only when the crate is built without the
//! `vulkan` feature (and therefore without `ash` itself as a dependency).
//! Every associated constant and method mirrors `ash::vk`'s API exactly, so
//! `sync::{state,stage,barrier,batch}` can `use self::flags as vk` and keep
//! every existing `vk::AccessFlags::X` call site unchanged under either
//! configuration.

use std::ops::{BitOr, BitOrAssign};

macro_rules! flags_type {
    ($name:ident { $($variant:ident = $bit:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
        pub struct $name(u32);

        impl $name {
            $(pub const $variant: $name = $name($bit);)+

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn from_raw(raw: u32) -> Self {
                $name(raw)
            }

            pub const fn as_raw(self) -> u32 {
                self.0
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

flags_type!(AccessFlags {
    COLOR_ATTACHMENT_READ = 1 << 0,
    COLOR_ATTACHMENT_WRITE = 1 << 1,
    DEPTH_STENCIL_ATTACHMENT_READ = 1 << 2,
    DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 3,
    INDEX_READ = 1 << 4,
    INPUT_ATTACHMENT_READ = 1 << 5,
    SHADER_READ = 1 << 6,
    SHADER_WRITE = 1 << 7,
    TRANSFER_READ = 1 << 8,
    TRANSFER_WRITE = 1 << 9,
    UNIFORM_READ = 1 << 10,
    VERTEX_ATTRIBUTE_READ = 1 << 11,
});

flags_type!(PipelineStageFlags {
    BOTTOM_OF_PIPE = 1 << 0,
    COLOR_ATTACHMENT_OUTPUT = 1 << 1,
    COMPUTE_SHADER = 1 << 2,
    EARLY_FRAGMENT_TESTS = 1 << 3,
    FRAGMENT_SHADER = 1 << 4,
    LATE_FRAGMENT_TESTS = 1 << 5,
    TRANSFER = 1 << 6,
    VERTEX_INPUT = 1 << 7,
    VERTEX_SHADER = 1 << 8,
});

/// Mirrors the handful of `ash::vk::ImageLayout` variants the sync engine
/// and render-pass cache reason about. `UNDEFINED` is `0`, matching real
/// Vulkan, so `#[derive(Default)]` gives the same "no layout yet" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ImageLayout(u32);

impl ImageLayout {
    pub const UNDEFINED: ImageLayout = ImageLayout(0);
    pub const GENERAL: ImageLayout = ImageLayout(1);
    pub const COLOR_ATTACHMENT_OPTIMAL: ImageLayout = ImageLayout(2);
    pub const DEPTH_STENCIL_ATTACHMENT_OPTIMAL: ImageLayout = ImageLayout(3);
    pub const SHADER_READ_ONLY_OPTIMAL: ImageLayout = ImageLayout(4);
    pub const TRANSFER_SRC_OPTIMAL: ImageLayout = ImageLayout(5);
    pub const TRANSFER_DST_OPTIMAL: ImageLayout = ImageLayout(6);
    pub const PRESENT_SRC_KHR: ImageLayout = ImageLayout(7);
}
