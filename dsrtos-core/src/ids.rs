//! Typed, generation-checked handles.
//!
//! Replaces opaque pointer/index handles with `{index, generation}` pairs:
//! reusing a slot bumps its generation, so a handle captured before a slot
//! was freed and reused compares unequal to the new occupant instead of
//! silently addressing the wrong object.

use core::fmt;

macro_rules! define_handle {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            index: u16,
            generation: u16,
        }

        impl $name {
            pub const fn new(index: u16, generation: u16) -> Self {
                Self { index, generation }
            }

            pub const fn index(self) -> usize {
                self.index as usize
            }

            pub const fn generation(self) -> u16 {
                self.generation
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}#{})", stringify!($name), self.index, self.generation)
            }
        }
    };
}

define_handle!(TaskId, "Handle to a task control block in the task arena.");
define_handle!(PluginId, "Handle to a registered scheduler plugin.");
define_handle!(ResourceId, "Handle to a lockable resource (mutex-like) used for priority inheritance.");
