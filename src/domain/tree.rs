//! The portfolio tree: valuation, unitization and capital allocation.
//!
//! All nodes live in one arena owned by [`Tree`]. The tree also owns the
//! market price table and the simulation clock (`now`), so every node sees the
//! same horizon and the same quotes.
//!
//! Reads go through [`Tree::refresh`]: a security that was left idle while the
//! clock advanced replays its valuation up to `now` before its value or price
//! is returned. Strategies are re-aggregated eagerly after every update and
//! every trade, so their cached value is current whenever the securities below
//! them are.

use chrono::NaiveDate;
use std::fmt;
use tracing::{debug, error, trace};

use super::commission::{checked_commission, CommissionModel, CommissionSchedule};
use super::error::NavtreeError;
use super::node::{History, Node, NodeId, NodeKind, NodeSpec, BASE_PRICE};
use super::price_table::{PriceRow, PriceTable, UniverseView};

const ROOT: NodeId = NodeId(0);

/// Relative tolerance for the value-conservation check.
const CONSERVATION_TOLERANCE: f64 = 1e-9;

/// An executed trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub path: String,
    pub quantity: i64,
    pub price: f64,
    pub commission: f64,
}

pub struct Tree {
    nodes: Vec<Node>,
    market: PriceTable,
    ready: bool,
    now: Option<usize>,
    commission: Box<dyn CommissionModel>,
    transactions: Vec<Transaction>,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.nodes.len())
            .field("ready", &self.ready)
            .field("now", &self.now())
            .finish_non_exhaustive()
    }
}

impl Tree {
    /// Builds a tree from a strategy spec with the default commission
    /// schedule (flat 1.0 per trade).
    pub fn new(root: NodeSpec) -> Result<Self, NavtreeError> {
        Tree::with_commission(root, CommissionSchedule::default())
    }

    pub fn with_commission<C>(root: NodeSpec, commission: C) -> Result<Self, NavtreeError>
    where
        C: CommissionModel + 'static,
    {
        let (name, children) = match root {
            NodeSpec::Strategy { name, children } => (name, children),
            NodeSpec::Security { name } => {
                return Err(NavtreeError::InvalidTree {
                    reason: format!("root {name} must be a strategy"),
                });
            }
        };
        let mut tree = Tree {
            nodes: vec![Node::strategy(name, None)],
            market: PriceTable::default(),
            ready: false,
            now: None,
            commission: Box::new(commission),
            transactions: Vec::new(),
        };
        for child in children {
            tree.attach(ROOT, child)?;
        }
        Ok(tree)
    }

    pub fn set_commission<C>(&mut self, commission: C)
    where
        C: CommissionModel + 'static,
    {
        self.commission = Box::new(commission);
    }

    /// Wires `spec` (and its subtree) under `parent`.
    pub fn attach(&mut self, parent: NodeId, spec: NodeSpec) -> Result<NodeId, NavtreeError> {
        self.expect_strategy(parent)?;
        if self.child(parent, spec.name()).is_some() {
            return Err(NavtreeError::DuplicateChild {
                parent: self.path(parent),
                name: spec.name().to_string(),
            });
        }

        let id = NodeId(self.nodes.len());
        let (mut node, children) = match spec {
            NodeSpec::Security { name } => (Node::security(name, Some(parent)), Vec::new()),
            NodeSpec::Strategy { name, children } => {
                (Node::strategy(name, Some(parent)), children)
            }
        };
        if self.ready {
            node.history = History::with_horizon(self.market.len());
            // a strategy joining mid-run held nothing on the dates already elapsed
            if let (NodeKind::Strategy(_), Some(now)) = (&node.kind, self.now) {
                for idx in 0..=now {
                    node.history.record(idx, 0.0, BASE_PRICE);
                }
            }
        }
        self.nodes.push(node);
        if let NodeKind::Strategy(s) = &mut self.nodes[parent.0].kind {
            s.children.push(id);
        }
        for child in children {
            self.attach(id, child)?;
        }
        Ok(id)
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Node count, root included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id.0].children()
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children()
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].name == name)
    }

    /// Looks up a node by `/`-separated names below the root, e.g. `"s1/c1"`.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(ROOT, |id, part| self.child(id, part))
    }

    /// Names from the root down to `id`, joined by `/`.
    pub fn path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            names.push(self.nodes[n.0].name.as_str());
            cur = self.nodes[n.0].parent;
        }
        names.reverse();
        names.join("/")
    }

    pub fn is_setup(&self) -> bool {
        self.ready
    }

    pub fn now(&self) -> Option<NaiveDate> {
        self.now.map(|i| self.market.dates()[i])
    }

    pub fn dates(&self) -> &[NaiveDate] {
        self.market.dates()
    }

    pub fn market(&self) -> &PriceTable {
        &self.market
    }

    /// Market prices visible at `now`.
    pub fn universe(&self) -> UniverseView<'_> {
        UniverseView::new(&self.market, self.now)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Binds the simulation horizon with no prices yet; quotes arrive through
    /// `update` rows or `bind_prices`.
    pub fn setup(&mut self, dates: Vec<NaiveDate>) -> Result<(), NavtreeError> {
        let table = PriceTable::new(dates)?;
        self.setup_with_prices(table);
        Ok(())
    }

    /// Binds the horizon to the table's dates and the table as market data.
    pub fn setup_with_prices(&mut self, prices: PriceTable) {
        let horizon = prices.len();
        self.market = prices;
        self.now = None;
        self.ready = true;
        for node in &mut self.nodes {
            node.history = History::with_horizon(horizon);
            if let NodeKind::Security(s) = &mut node.kind {
                s.cursor = None;
                s.market_price = f64::NAN;
            }
        }
    }

    /// Supplies the full price series for one instrument name.
    pub fn bind_prices(&mut self, name: &str, prices: Vec<f64>) -> Result<(), NavtreeError> {
        self.require_setup(ROOT)?;
        self.market.insert_column(name, prices)
    }

    /// Advances the clock to `date`, absorbing `row` into the market table,
    /// and revalues the tree children first. Horizon dates skipped since the
    /// previous update are replayed with unchanged holdings.
    pub fn update(&mut self, date: NaiveDate, row: Option<&PriceRow>) -> Result<(), NavtreeError> {
        self.require_setup(ROOT)?;
        let target = self
            .market
            .date_index(date)
            .ok_or(NavtreeError::DateOutOfHorizon { date })?;
        if let Some(now) = self.now {
            if target < now {
                return Err(NavtreeError::StaleDate {
                    date,
                    now: self.market.dates()[now],
                });
            }
        }

        if let Some(row) = row {
            for (name, price) in row.iter() {
                self.market.set(name, target, price);
            }
            self.invalidate_quoted(row, target);
        }

        let start = match self.now {
            Some(now) if now == target => target,
            Some(now) => now + 1,
            None => 0,
        };
        for idx in start..=target {
            if idx != target {
                trace!(date = %self.market.dates()[idx], "replaying skipped date");
            }
            self.now = Some(idx);
            self.revalue(ROOT);
        }
        self.check_conservation();
        Ok(())
    }

    /// Brings `id` (and, for a strategy, every holding below it) up to `now`.
    pub fn refresh(&mut self, id: NodeId) -> Result<(), NavtreeError> {
        self.require_setup(id)?;
        let Some(now) = self.now else {
            return Ok(());
        };

        let lagging = self.lagging_securities(id, now);
        for &sec in &lagging {
            self.catch_up(sec);
        }
        for sec in lagging {
            if let Some(parent) = self.nodes[sec.0].parent {
                self.settle_from(parent);
            }
        }
        Ok(())
    }

    pub fn value(&mut self, id: NodeId) -> Result<f64, NavtreeError> {
        self.refresh(id)?;
        Ok(self.nodes[id.0].cached_value())
    }

    /// Market price for a security, NAV per unit for a strategy.
    pub fn price(&mut self, id: NodeId) -> Result<f64, NavtreeError> {
        self.refresh(id)?;
        Ok(match &self.nodes[id.0].kind {
            NodeKind::Security(s) => s.market_price,
            NodeKind::Strategy(s) => s.nav(),
        })
    }

    /// Shares held for a security, NAV units for a strategy.
    pub fn units(&mut self, id: NodeId) -> Result<f64, NavtreeError> {
        self.refresh(id)?;
        Ok(match &self.nodes[id.0].kind {
            NodeKind::Security(s) => s.position as f64,
            NodeKind::Strategy(s) => s.units,
        })
    }

    /// `value / parent.value`; 0 when the parent holds nothing, 1 for the root.
    pub fn weight(&mut self, id: NodeId) -> Result<f64, NavtreeError> {
        self.refresh(id)?;
        let Some(parent) = self.nodes[id.0].parent else {
            return Ok(1.0);
        };
        self.refresh(parent)?;
        let parent_value = self.nodes[parent.0].cached_value();
        if parent_value == 0.0 {
            return Ok(0.0);
        }
        Ok(self.nodes[id.0].cached_value() / parent_value)
    }

    /// Shares held; always 0 for a strategy.
    pub fn position(&self, id: NodeId) -> i64 {
        match &self.nodes[id.0].kind {
            NodeKind::Security(s) => s.position,
            NodeKind::Strategy(_) => 0,
        }
    }

    /// Uninvested cash; always 0 for a security.
    pub fn capital(&self, id: NodeId) -> f64 {
        match &self.nodes[id.0].kind {
            NodeKind::Security(_) => 0.0,
            NodeKind::Strategy(s) => s.capital,
        }
    }

    pub fn values(&mut self, id: NodeId) -> Result<&[f64], NavtreeError> {
        self.refresh(id)?;
        Ok(self.nodes[id.0].history.values())
    }

    pub fn prices(&mut self, id: NodeId) -> Result<&[f64], NavtreeError> {
        self.refresh(id)?;
        Ok(self.nodes[id.0].history.prices())
    }

    /// Dates matching `values(id)` / `prices(id)`.
    pub fn history_dates(&mut self, id: NodeId) -> Result<&[NaiveDate], NavtreeError> {
        self.refresh(id)?;
        let filled = self.nodes[id.0].history.len();
        Ok(&self.market.dates()[..filled])
    }

    /// Injects (or withdraws) capital straight into a strategy's cash, minting
    /// or redeeming units at the current NAV. Children are not touched.
    pub fn adjust(&mut self, id: NodeId, amount: f64) -> Result<(), NavtreeError> {
        self.require_setup(id)?;
        self.expect_strategy(id)?;
        self.refresh(id)?;
        if amount == 0.0 {
            return Ok(());
        }
        self.flow_in(id, amount);
        self.settle_from(id);
        debug!(node = %self.path(id), amount, "capital adjusted");
        self.check_conservation();
        Ok(())
    }

    /// Commits `amount` of value into the subtree rooted at `id`.
    ///
    /// A security converts the amount into a whole-share trade paid from its
    /// parent's cash. A strategy receives the amount from its parent (as a
    /// unit-minting flow) and passes it on to its children in proportion to
    /// their current weights; with no weighted children it stays as cash.
    pub fn allocate(&mut self, id: NodeId, amount: f64) -> Result<(), NavtreeError> {
        self.require_setup(id)?;
        self.allocate_inner(id, amount)?;
        self.check_conservation();
        Ok(())
    }

    /// Allocates to the child `name` of `parent`, materializing a security
    /// for it first when the market table knows the name.
    pub fn allocate_to(
        &mut self,
        parent: NodeId,
        name: &str,
        amount: f64,
    ) -> Result<NodeId, NavtreeError> {
        self.require_setup(parent)?;
        self.expect_strategy(parent)?;
        let child = match self.child(parent, name) {
            Some(c) => c,
            None => self.materialize(parent, name)?,
        };
        self.allocate(child, amount)?;
        Ok(child)
    }

    /// Unwinds the child `name` of `parent` to zero value.
    pub fn close(&mut self, parent: NodeId, name: &str) -> Result<(), NavtreeError> {
        self.require_setup(parent)?;
        let child = self
            .child(parent, name)
            .ok_or_else(|| NavtreeError::UnknownChild {
                parent: self.path(parent),
                name: name.to_string(),
            })?;
        self.close_node(child)?;
        self.check_conservation();
        Ok(())
    }

    /// Closes every child of `id` holding a non-zero value, in child order.
    pub fn flatten(&mut self, id: NodeId) -> Result<(), NavtreeError> {
        self.require_setup(id)?;
        self.expect_strategy(id)?;
        self.refresh(id)?;
        for i in 0..self.nodes[id.0].children().len() {
            let child = self.nodes[id.0].children()[i];
            if self.nodes[child.0].cached_value() != 0.0 {
                self.close_node(child)?;
            }
        }
        self.check_conservation();
        Ok(())
    }

    /// Worst strategy whose value differs from capital plus children.
    pub fn conservation_gap(&self) -> Option<(NodeId, f64)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| {
                let NodeKind::Strategy(s) = &node.kind else {
                    return None;
                };
                let children: f64 = s
                    .children
                    .iter()
                    .map(|c| self.nodes[c.0].cached_value())
                    .sum();
                let gap = (s.value - (s.capital + children)).abs();
                let tolerance = CONSERVATION_TOLERANCE * s.value.abs().max(1.0);
                (gap > tolerance).then_some((NodeId(i), gap))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn check_conservation(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        if let Some((id, gap)) = self.conservation_gap() {
            let path = self.path(id);
            error!(node = %path, gap, "value conservation violated");
            panic!("value conservation violated at {path}: gap {gap}");
        }
    }

    fn require_setup(&self, id: NodeId) -> Result<(), NavtreeError> {
        if self.ready {
            Ok(())
        } else {
            Err(NavtreeError::NotInitialized {
                node: self.path(id),
            })
        }
    }

    fn expect_strategy(&self, id: NodeId) -> Result<(), NavtreeError> {
        if self.nodes[id.0].is_strategy() {
            Ok(())
        } else {
            Err(NavtreeError::NotAStrategy {
                name: self.path(id),
            })
        }
    }

    fn materialize(&mut self, parent: NodeId, name: &str) -> Result<NodeId, NavtreeError> {
        if !self.market.has_column(name) {
            return Err(NavtreeError::UnknownChild {
                parent: self.path(parent),
                name: name.to_string(),
            });
        }
        let id = self.attach(parent, NodeSpec::security(name))?;
        debug!(node = %self.path(id), "security materialized");
        Ok(id)
    }

    fn allocate_inner(&mut self, id: NodeId, amount: f64) -> Result<(), NavtreeError> {
        if amount == 0.0 || amount.is_nan() {
            return Ok(());
        }
        if self.nodes[id.0].is_security() {
            self.refresh(id)?;
            let price = self.tradable_price(id)?;
            let quantity = (amount / price).trunc() as i64;
            self.execute(id, quantity)
        } else {
            self.allocate_strategy(id, amount)
        }
    }

    fn allocate_strategy(&mut self, id: NodeId, amount: f64) -> Result<(), NavtreeError> {
        self.refresh(id)?;
        let value = self.nodes[id.0].cached_value();
        let weights: Vec<(NodeId, f64)> = if value == 0.0 {
            Vec::new()
        } else {
            self.nodes[id.0]
                .children()
                .iter()
                .map(|c| (*c, self.nodes[c.0].cached_value() / value))
                .filter(|(_, w)| *w != 0.0)
                .collect()
        };

        if let Some(parent) = self.nodes[id.0].parent {
            if let NodeKind::Strategy(p) = &mut self.nodes[parent.0].kind {
                p.capital -= amount;
            }
            self.flow_in(id, amount);
            self.settle_from(id);
            debug!(node = %self.path(id), amount, "capital allocated from parent");
        }

        for (child, weight) in weights {
            self.allocate_inner(child, amount * weight)?;
        }
        Ok(())
    }

    fn close_node(&mut self, id: NodeId) -> Result<(), NavtreeError> {
        self.refresh(id)?;
        match &self.nodes[id.0].kind {
            NodeKind::Security(s) => {
                let quantity = -s.position;
                self.execute(id, quantity)
            }
            NodeKind::Strategy(s) => {
                let value = s.value;
                self.allocate_inner(id, -value)
            }
        }
    }

    /// Trades `quantity` shares of a security at its current price.
    fn execute(&mut self, id: NodeId, quantity: i64) -> Result<(), NavtreeError> {
        if quantity == 0 {
            return Ok(());
        }
        let price = self.tradable_price(id)?;
        let (Some(now), Some(parent)) = (self.now, self.nodes[id.0].parent) else {
            return Err(NavtreeError::MissingPrice {
                name: self.path(id),
            });
        };
        let path = self.path(id);
        let commission = checked_commission(self.commission.as_ref(), &path, quantity, price)?;
        let notional = quantity as f64 * price;

        let node = &mut self.nodes[id.0];
        if let NodeKind::Security(s) = &mut node.kind {
            s.position += quantity;
            s.value = s.position as f64 * price;
            s.cursor = Some(now);
            node.history.record(now, s.value, price);
        }
        if let NodeKind::Strategy(p) = &mut self.nodes[parent.0].kind {
            p.capital -= notional + commission;
        }
        self.settle_from(parent);

        debug!(node = %path, quantity, price, commission, "trade executed");
        self.transactions.push(Transaction {
            date: self.market.dates()[now],
            path,
            quantity,
            price,
            commission,
        });
        Ok(())
    }

    fn tradable_price(&self, id: NodeId) -> Result<f64, NavtreeError> {
        match &self.nodes[id.0].kind {
            NodeKind::Security(s) if s.market_price.is_finite() && s.market_price > 0.0 => {
                Ok(s.market_price)
            }
            _ => Err(NavtreeError::MissingPrice {
                name: self.path(id),
            }),
        }
    }

    fn flow_in(&mut self, id: NodeId, amount: f64) {
        if let NodeKind::Strategy(s) = &mut self.nodes[id.0].kind {
            s.mint_units(amount);
            s.capital += amount;
        }
    }

    fn revalue(&mut self, id: NodeId) {
        if let NodeKind::Security(s) = &self.nodes[id.0].kind {
            if s.position != 0 {
                self.catch_up(id);
            }
            return;
        }
        for i in 0..self.nodes[id.0].children().len() {
            let child = self.nodes[id.0].children()[i];
            self.revalue(child);
        }
        self.aggregate(id);
    }

    /// Securities under `id` (or `id` itself) not yet valued at `now`. Below a
    /// strategy only held positions matter; idle flat securities are left for
    /// their own reads.
    fn lagging_securities(&self, id: NodeId, now: usize) -> Vec<NodeId> {
        let behind = |node: &Node| match &node.kind {
            NodeKind::Security(s) => s.cursor != Some(now),
            NodeKind::Strategy(_) => false,
        };
        if self.nodes[id.0].is_security() {
            return if behind(&self.nodes[id.0]) {
                vec![id]
            } else {
                Vec::new()
            };
        }

        let mut lagging = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n.0];
            match &node.kind {
                NodeKind::Security(s) if s.position != 0 && behind(node) => lagging.push(n),
                NodeKind::Security(_) => {}
                NodeKind::Strategy(s) => stack.extend(s.children.iter().copied()),
            }
        }
        lagging
    }

    /// Replays a security's valuation from its cursor to `now` with its
    /// current position. The replayed entries are committed together.
    fn catch_up(&mut self, id: NodeId) {
        let Some(now) = self.now else {
            return;
        };
        let node = &mut self.nodes[id.0];
        let NodeKind::Security(sec) = &mut node.kind else {
            return;
        };
        let start = match sec.cursor {
            Some(c) if c >= now => now,
            Some(c) => c + 1,
            None => 0,
        };

        let col = self.market.column_index(&node.name);
        let mut last = match (col, start) {
            (Some(c), s) if s > 0 => self.market.last_price(c, s - 1),
            _ => None,
        };
        let mut staged = Vec::with_capacity(now + 1 - start);
        for idx in start..=now {
            if let Some(p) = col.and_then(|c| self.market.quote(c, idx)) {
                last = Some(p);
            }
            let price = last.unwrap_or(f64::NAN);
            let value = if sec.position == 0 {
                0.0
            } else {
                sec.position as f64 * price
            };
            staged.push((idx, value, price));
        }
        if staged.len() > 1 {
            trace!(node = %node.name, dates = staged.len(), "security caught up");
        }

        for &(idx, value, price) in &staged {
            node.history.record(idx, value, price);
        }
        if let Some(&(_, value, price)) = staged.last() {
            sec.value = value;
            sec.market_price = price;
        }
        sec.cursor = Some(now);
    }

    /// Securities already valued at `row_idx` must re-read the quotes a row
    /// just wrote there.
    fn invalidate_quoted(&mut self, row: &PriceRow, row_idx: usize) {
        for node in &mut self.nodes {
            if row.get(&node.name).is_none() {
                continue;
            }
            if let NodeKind::Security(s) = &mut node.kind {
                if s.cursor == Some(row_idx) {
                    s.cursor = row_idx.checked_sub(1);
                }
            }
        }
    }

    fn aggregate(&mut self, id: NodeId) {
        let children: f64 = self.nodes[id.0]
            .children()
            .iter()
            .map(|c| self.nodes[c.0].cached_value())
            .sum();
        let now = self.now;
        let node = &mut self.nodes[id.0];
        if let NodeKind::Strategy(s) = &mut node.kind {
            s.value = s.capital + children;
            if let Some(idx) = now {
                node.history.record(idx, s.value, s.nav());
            }
        }
    }

    /// Re-aggregates `id` and every strategy above it.
    fn settle_from(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.nodes[n.0].is_strategy() {
                self.aggregate(n);
            }
            cur = self.nodes[n.0].parent;
        }
    }
}
