use super::*;
use std::fmt;

impl fmt::Debug for Pool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_pool(self, f)
    }
}

impl fmt::Debug for PoolElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolElement")
            .field("offset", &self.offset)
            .field("len", &self.len())
            .finish()
    }
}
