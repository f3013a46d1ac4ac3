//! Recency list over connection slots. Index-linked rather than
//! pointer-linked: `links[id]` holds the neighbours of slot `id`, so the
//! list shares its keying with the connection table. Touching a slot moves
//! it to the back, which keeps the front the least recently active.

#[derive(Clone, Copy, Default)]
struct Link {
    prev: Option<usize>,
    next: Option<usize>,
    linked: bool,
}

#[derive(Default)]
pub(crate) struct RecencyList {
    links: Vec<Link>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl RecencyList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Least recently touched slot.
    pub(crate) fn front(&self) -> Option<usize> {
        self.head
    }

    pub(crate) fn push_back(&mut self, id: usize) {
        if self.links.len() <= id {
            self.links.resize(id + 1, Link::default());
        }
        debug_assert!(!self.links[id].linked);
        self.links[id] = Link {
            prev: self.tail,
            next: None,
            linked: true,
        };
        match self.tail {
            Some(tail) => self.links[tail].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Unlinks a slot; a no-op when the slot is not on the list.
    pub(crate) fn detach(&mut self, id: usize) {
        let link = match self.links.get(id) {
            Some(link) if link.linked => *link,
            _ => return,
        };
        match link.prev {
            Some(prev) => self.links[prev].next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => self.links[next].prev = link.prev,
            None => self.tail = link.prev,
        }
        self.links[id] = Link::default();
    }

    /// Records activity on a slot by moving it to the back.
    pub(crate) fn touch(&mut self, id: usize) {
        self.detach(id);
        self.push_back(id);
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.head, |&id| self.links[id].next)
    }
}
