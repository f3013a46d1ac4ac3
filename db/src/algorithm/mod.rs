pub(crate) mod avl;
pub(crate) mod dict;
pub(crate) mod heap;
pub(crate) mod recency;
