//! Arcs between ports and the reachability index built over them.

/// A directed connection from an output port of one node to an input port of another.
///
/// Arcs are plain values. The derived ordering compares
/// `(source_node, dest_node, source_port, dest_port)` in that order, which is the
/// order the graph keeps its arc list in for deduplication and binary search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortArc {
    /// Node the data comes from.
    pub source_node: u32,
    /// Node the data goes to.
    pub dest_node: u32,
    /// Output port on `source_node`.
    pub source_port: u32,
    /// Input port on `dest_node`.
    pub dest_port: u32,
}

impl PortArc {
    /// Creates an arc. No validation happens here.
    pub fn new(source_node: u32, source_port: u32, dest_node: u32, dest_port: u32) -> Self {
        Self {
            source_node,
            dest_node,
            source_port,
            dest_port,
        }
    }

    /// Whether the arc starts or ends at `node`.
    #[inline]
    pub fn touches(&self, node: u32) -> bool {
        self.source_node == node || self.dest_node == node
    }
}

impl std::fmt::Display for PortArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} → {}:{}",
            self.source_node, self.source_port, self.dest_node, self.dest_port
        )
    }
}

#[derive(Clone, Debug)]
struct Entry {
    dest: u32,
    /// Sorted, deduplicated.
    sources: Vec<u32>,
}

/// Node-level reachability index over a snapshot of arcs.
///
/// Holds one entry per destination node, sorted by node id, each listing the
/// nodes that feed it directly.
#[derive(Clone, Debug, Default)]
pub struct ArcTable {
    entries: Vec<Entry>,
}

impl ArcTable {
    /// Builds the table from an arc slice.
    pub fn new(arcs: &[PortArc]) -> Self {
        let mut table = Self::default();
        for arc in arcs {
            table.add(arc.source_node, arc.dest_node);
        }
        table
    }

    fn add(&mut self, source: u32, dest: u32) {
        let pos = match self.entries.binary_search_by_key(&dest, |e| e.dest) {
            Ok(pos) => pos,
            Err(pos) => {
                self.entries.insert(
                    pos,
                    Entry {
                        dest,
                        sources: Vec::new(),
                    },
                );
                pos
            }
        };
        let sources = &mut self.entries[pos].sources;
        if let Err(at) = sources.binary_search(&source) {
            sources.insert(at, source);
        }
    }

    fn find(&self, dest: u32) -> Option<usize> {
        self.entries.binary_search_by_key(&dest, |e| e.dest).ok()
    }

    /// Nodes that feed `dest` directly.
    pub fn direct_sources(&self, dest: u32) -> &[u32] {
        self.find(dest)
            .map(|i| self.entries[i].sources.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `a` feeds `b`, directly or through other nodes.
    ///
    /// Each destination entry is expanded at most once, so the walk ends after
    /// at most [`len`](Self::len) expansions even when the arc set has a cycle.
    pub fn is_an_input_to(&self, a: u32, b: u32) -> bool {
        let Some(start) = self.find(b) else {
            return false;
        };
        let mut expanded = vec![false; self.entries.len()];
        let mut stack = vec![start];

        while let Some(idx) = stack.pop() {
            if expanded[idx] {
                continue;
            }
            expanded[idx] = true;

            let sources = &self.entries[idx].sources;
            if sources.binary_search(&a).is_ok() {
                return true;
            }
            stack.extend(sources.iter().filter_map(|&s| self.find(s)));
        }
        false
    }

    /// Number of destination entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
