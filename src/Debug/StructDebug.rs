// Debug renderings for handles. They only read header words and counters,
// never payload bytes, which may be mid-rewrite.

use std::fmt;

use crate::Core::pool::Pool;
use crate::MPMC::Bcast::{BroadcastQueue, Subscriber};
use crate::MPMC::Queue::WorkQueue;

/// Debug function for Pool
///
/// Shows the fixed geometry and the release counter. The free count is
/// left out: walking the list races with live acquirers.
pub fn debug_pool(pool: &Pool<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pool")
        .field("base", &format_args!("{:p}", pool.base()))
        .field("num_elements", &pool.num_elements())
        .field("element_size", &pool.element_size())
        .field("stride", &pool.stride())
        .field("releases", &pool.releases())
        .field("owned", &pool.is_owned())
        .finish()
}

/// Debug function for BroadcastQueue
///
/// Shows:
/// - Base address of the region
/// - Depth and element size
/// - Head and tail logical indices
pub fn debug_broadcast_queue(queue: &BroadcastQueue<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BroadcastQueue")
        .field("base", &format_args!("{:p}", queue.base()))
        .field("depth", &queue.depth())
        .field("element_size", &queue.element_size())
        .field("head_idx", &queue.head_index())
        .field("tail_idx", &queue.tail_index())
        .field("owned", &queue.is_owned())
        .finish()
}

/// Debug function for Subscriber
pub fn debug_subscriber(sub: &Subscriber<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscriber")
        .field("queue", &format_args!("{:p}", sub.queue().base()))
        .field("next_idx", &sub.next_index())
        .field("drops", &sub.drops())
        .field("active", &sub.is_active())
        .finish()
}

/// Debug function for WorkQueue
pub fn debug_work_queue(queue: &WorkQueue<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkQueue")
        .field("depth", &queue.depth())
        .field("head_idx", &queue.head_index())
        .field("tail_idx", &queue.tail_index())
        .field("owned", &queue.is_owned())
        .finish()
}
