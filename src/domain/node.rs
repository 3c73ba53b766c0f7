//! Tree nodes: detached specs, arena ids and per-node state.
//!
//! A node is either a security (leaf, holds an integer position in one
//! instrument) or a strategy (branch, holds cash and child nodes). Parents own
//! their children through the [`Tree`](super::tree::Tree) arena; the parent
//! back-pointer is a plain [`NodeId`].

/// NAV of a strategy before any capital has been contributed.
pub const BASE_PRICE: f64 = 100.0;

/// Index of a node inside its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Detached description of a node and its subtree, wired into a tree by
/// `Tree::new` or `Tree::attach`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    Security {
        name: String,
    },
    Strategy {
        name: String,
        children: Vec<NodeSpec>,
    },
}

impl NodeSpec {
    pub fn security(name: impl Into<String>) -> Self {
        NodeSpec::Security { name: name.into() }
    }

    pub fn strategy(name: impl Into<String>, children: Vec<NodeSpec>) -> Self {
        NodeSpec::Strategy {
            name: name.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeSpec::Security { name } | NodeSpec::Strategy { name, .. } => name,
        }
    }
}

/// Value and price history over the simulation horizon.
///
/// Slots are allocated for every horizon date at setup; `filled` tracks how
/// far the node has been valued.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    values: Vec<f64>,
    prices: Vec<f64>,
    filled: usize,
}

impl History {
    pub(crate) fn with_horizon(len: usize) -> Self {
        History {
            values: vec![f64::NAN; len],
            prices: vec![f64::NAN; len],
            filled: 0,
        }
    }

    pub(crate) fn record(&mut self, idx: usize, value: f64, price: f64) {
        if idx >= self.values.len() {
            return;
        }
        self.values[idx] = value;
        self.prices[idx] = price;
        self.filled = self.filled.max(idx + 1);
    }

    pub fn values(&self) -> &[f64] {
        &self.values[..self.filled]
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices[..self.filled]
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn horizon(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityState {
    pub(crate) position: i64,
    pub(crate) value: f64,
    pub(crate) market_price: f64,
    /// Last horizon index this security was valued at.
    pub(crate) cursor: Option<usize>,
}

impl SecurityState {
    fn new() -> Self {
        SecurityState {
            position: 0,
            value: 0.0,
            market_price: f64::NAN,
            cursor: None,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyState {
    pub(crate) children: Vec<NodeId>,
    pub(crate) capital: f64,
    pub(crate) value: f64,
    pub(crate) units: f64,
}

impl StrategyState {
    fn new() -> Self {
        StrategyState {
            children: Vec::new(),
            capital: 0.0,
            value: 0.0,
            units: 0.0,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn units(&self) -> f64 {
        self.units
    }

    /// Value per unit; the base price until units exist.
    pub fn nav(&self) -> f64 {
        if self.units == 0.0 {
            BASE_PRICE
        } else {
            self.value / self.units
        }
    }

    /// Mints (or redeems, for a negative amount) units at the current NAV so
    /// the flow itself leaves the NAV unchanged. Must run before the flow is
    /// added to capital.
    pub(crate) fn mint_units(&mut self, amount: f64) {
        if self.units == 0.0 {
            self.units = amount / BASE_PRICE;
            return;
        }
        let nav = self.nav();
        if nav.is_finite() && nav > 0.0 {
            self.units += amount / nav;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Security(SecurityState),
    Strategy(StrategyState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) history: History,
}

impl Node {
    pub(crate) fn security(name: String, parent: Option<NodeId>) -> Self {
        Node {
            name,
            parent,
            kind: NodeKind::Security(SecurityState::new()),
            history: History::default(),
        }
    }

    pub(crate) fn strategy(name: String, parent: Option<NodeId>) -> Self {
        Node {
            name,
            parent,
            kind: NodeKind::Strategy(StrategyState::new()),
            history: History::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_security(&self) -> bool {
        matches!(self.kind, NodeKind::Security(_))
    }

    pub fn is_strategy(&self) -> bool {
        matches!(self.kind, NodeKind::Strategy(_))
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Strategy(s) => &s.children,
            NodeKind::Security(_) => &[],
        }
    }

    /// Cached value as of the last valuation.
    pub(crate) fn cached_value(&self) -> f64 {
        match &self.kind {
            NodeKind::Security(s) => s.value,
            NodeKind::Strategy(s) => s.value,
        }
    }
}
