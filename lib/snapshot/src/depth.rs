/// How many directory levels below a node are tracked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MaxDepth {
    #[default]
    Unbounded,
    /// `Levels(0)` tracks the node alone, `Levels(1)` its immediate
    /// children, and so on.
    Levels(u32),
}

impl MaxDepth {
    /// The budget left for a child, or `None` when children are not tracked.
    pub fn descend(self) -> Option<MaxDepth> {
        match self {
            MaxDepth::Unbounded => Some(MaxDepth::Unbounded),
            MaxDepth::Levels(0) => None,
            MaxDepth::Levels(n) => Some(MaxDepth::Levels(n - 1)),
        }
    }
}

/// Negative values mean unbounded.
impl From<i32> for MaxDepth {
    fn from(depth: i32) -> Self {
        u32::try_from(depth).map_or(MaxDepth::Unbounded, MaxDepth::Levels)
    }
}

impl From<u32> for MaxDepth {
    fn from(depth: u32) -> Self {
        MaxDepth::Levels(depth)
    }
}
