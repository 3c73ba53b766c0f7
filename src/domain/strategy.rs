//! Root orchestrator: a tree plus the per-period decision hook.
//!
//! A [`Strategy`] owns the [`Tree`], a typed [`Temp`] scratch area and an
//! ordered stack of [`Algo`]s. Each period the driver calls `update` and then
//! `run`; the algos read `now`, the universe and the children, stage their
//! decisions in `temp` and finally trade through the tree.

use chrono::NaiveDate;

use super::error::NavtreeError;
use super::node::{NodeId, NodeSpec};
use super::price_table::{PriceRow, PriceTable, UniverseView};
use super::tree::Tree;

/// Scratch decisions for the current period, cleared on every new date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Temp {
    /// Instrument names picked by the selection step.
    pub selected: Vec<String>,
    /// Target weights per child name, consumed by the allocation step.
    pub weights: Vec<(String, f64)>,
}

impl Temp {
    pub fn clear(&mut self) {
        self.selected.clear();
        self.weights.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty() && self.weights.is_empty()
    }

    pub fn weight(&self, name: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| *w)
    }
}

/// One step of a strategy's per-period logic. Returning `Ok(false)` stops the
/// remaining algos for this period.
pub trait Algo {
    fn run(&mut self, tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError>;
}

impl<F> Algo for F
where
    F: FnMut(&mut Tree, &mut Temp) -> Result<bool, NavtreeError>,
{
    fn run(&mut self, tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError> {
        self(tree, temp)
    }
}

pub struct Strategy {
    tree: Tree,
    temp: Temp,
    algos: Vec<Box<dyn Algo>>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("tree", &self.tree)
            .field("temp", &self.temp)
            .field("algos", &self.algos.len())
            .finish()
    }
}

impl Strategy {
    pub fn new(name: &str, children: Vec<NodeSpec>) -> Result<Self, NavtreeError> {
        let tree = Tree::new(NodeSpec::strategy(name, children))?;
        Ok(Strategy::from_tree(tree))
    }

    pub fn from_tree(tree: Tree) -> Self {
        Strategy {
            tree,
            temp: Temp::default(),
            algos: Vec::new(),
        }
    }

    pub fn with_algo<A: Algo + 'static>(mut self, algo: A) -> Self {
        self.push_algo(algo);
        self
    }

    pub fn push_algo<A: Algo + 'static>(&mut self, algo: A) {
        self.algos.push(Box::new(algo));
    }

    pub fn name(&self) -> &str {
        self.tree.node(self.tree.root()).name()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn temp(&self) -> &Temp {
        &self.temp
    }

    pub fn temp_mut(&mut self) -> &mut Temp {
        &mut self.temp
    }

    pub fn setup(&mut self, dates: Vec<NaiveDate>) -> Result<(), NavtreeError> {
        self.tree.setup(dates)
    }

    pub fn setup_with_prices(&mut self, prices: PriceTable) {
        self.tree.setup_with_prices(prices);
    }

    /// Advances the tree to `date`; `temp` starts empty on each new date.
    pub fn update(&mut self, date: NaiveDate, row: Option<&PriceRow>) -> Result<(), NavtreeError> {
        let before = self.tree.now();
        self.tree.update(date, row)?;
        if before != Some(date) {
            self.temp.clear();
        }
        Ok(())
    }

    /// Runs the algo stack once for the current period.
    pub fn run(&mut self) -> Result<(), NavtreeError> {
        for algo in &mut self.algos {
            if !algo.run(&mut self.tree, &mut self.temp)? {
                break;
            }
        }
        Ok(())
    }

    pub fn adjust(&mut self, amount: f64) -> Result<(), NavtreeError> {
        let root = self.tree.root();
        self.tree.adjust(root, amount)
    }

    /// Distributes `amount` over the current children by weight.
    pub fn allocate(&mut self, amount: f64) -> Result<(), NavtreeError> {
        let root = self.tree.root();
        self.tree.allocate(root, amount)
    }

    pub fn allocate_to(&mut self, name: &str, amount: f64) -> Result<NodeId, NavtreeError> {
        let root = self.tree.root();
        self.tree.allocate_to(root, name, amount)
    }

    pub fn close(&mut self, name: &str) -> Result<(), NavtreeError> {
        let root = self.tree.root();
        self.tree.close(root, name)
    }

    pub fn flatten(&mut self) -> Result<(), NavtreeError> {
        let root = self.tree.root();
        self.tree.flatten(root)
    }

    pub fn value(&mut self) -> Result<f64, NavtreeError> {
        let root = self.tree.root();
        self.tree.value(root)
    }

    pub fn price(&mut self) -> Result<f64, NavtreeError> {
        let root = self.tree.root();
        self.tree.price(root)
    }

    pub fn capital(&self) -> f64 {
        self.tree.capital(self.tree.root())
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.tree.child(self.tree.root(), name)
    }

    pub fn universe(&self) -> UniverseView<'_> {
        self.tree.universe()
    }

    pub fn now(&self) -> Option<NaiveDate> {
        self.tree.now()
    }
}
