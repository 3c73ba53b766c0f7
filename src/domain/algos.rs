//! Building blocks for a strategy's per-period logic.
//!
//! Algos run in stack order. Scheduling gates return `false` to skip the rest
//! of the stack on off-dates; selection algos fill `temp.selected`; weighing
//! algos turn the selection into `temp.weights`; [`Rebalance`] trades the tree
//! to those weights.

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use super::error::NavtreeError;
use super::price_table::UniverseView;
use super::strategy::{Algo, Temp};
use super::tree::Tree;

/// True on the first visible date and whenever `key` differs from the
/// previous horizon date.
fn period_changed<K, F>(tree: &Tree, key: F) -> bool
where
    K: PartialEq,
    F: Fn(NaiveDate) -> K,
{
    match tree.universe().dates() {
        [] => false,
        [_] => true,
        [.., prev, now] => key(*prev) != key(*now),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOnce {
    done: bool,
}

impl RunOnce {
    pub fn new() -> Self {
        RunOnce::default()
    }
}

impl Algo for RunOnce {
    fn run(&mut self, _tree: &mut Tree, _temp: &mut Temp) -> Result<bool, NavtreeError> {
        if self.done {
            return Ok(false);
        }
        self.done = true;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunDaily;

impl Algo for RunDaily {
    fn run(&mut self, tree: &mut Tree, _temp: &mut Temp) -> Result<bool, NavtreeError> {
        Ok(period_changed(tree, |d| d))
    }
}

/// Runs on the first date of each ISO week.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunWeekly;

impl Algo for RunWeekly {
    fn run(&mut self, tree: &mut Tree, _temp: &mut Temp) -> Result<bool, NavtreeError> {
        Ok(period_changed(tree, |d| d.iso_week()))
    }
}

/// Runs on the first date of each calendar month.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunMonthly;

impl Algo for RunMonthly {
    fn run(&mut self, tree: &mut Tree, _temp: &mut Temp) -> Result<bool, NavtreeError> {
        Ok(period_changed(tree, |d| (d.year(), d.month())))
    }
}

/// Selects every instrument quoted on the current date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAll;

impl Algo for SelectAll {
    fn run(&mut self, tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError> {
        temp.selected = tree
            .universe()
            .current_row()
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect();
        Ok(true)
    }
}

/// Selects instruments whose current quote is above their trailing simple
/// moving average. Instruments without `period` consecutive quotes are
/// skipped.
#[derive(Debug, Clone, Copy)]
pub struct SelectAboveSma {
    pub period: usize,
}

impl SelectAboveSma {
    pub fn new(period: usize) -> Self {
        SelectAboveSma { period }
    }
}

pub fn trailing_sma(history: &[f64], period: usize) -> Option<f64> {
    if period == 0 || history.len() < period {
        return None;
    }
    let window = &history[history.len() - period..];
    if window.iter().any(|p| !p.is_finite()) {
        return None;
    }
    Some(window.iter().sum::<f64>() / period as f64)
}

impl Algo for SelectAboveSma {
    fn run(&mut self, tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError> {
        let universe = tree.universe();
        temp.selected = universe
            .current_row()
            .into_iter()
            .filter(|(name, price)| {
                universe
                    .column(name)
                    .and_then(|history| trailing_sma(history, self.period))
                    .is_some_and(|sma| *price > sma)
            })
            .map(|(name, _)| name.to_string())
            .collect();
        Ok(true)
    }
}

/// Selects quoted instruments accepted by a predicate over
/// `(universe, name, current price)`.
pub struct SelectWhere<F> {
    predicate: F,
}

impl<F> SelectWhere<F>
where
    F: Fn(&UniverseView<'_>, &str, f64) -> bool,
{
    pub fn new(predicate: F) -> Self {
        SelectWhere { predicate }
    }
}

impl<F> Algo for SelectWhere<F>
where
    F: Fn(&UniverseView<'_>, &str, f64) -> bool,
{
    fn run(&mut self, tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError> {
        let universe = tree.universe();
        temp.selected = universe
            .current_row()
            .into_iter()
            .filter(|(name, price)| (self.predicate)(&universe, name, *price))
            .map(|(name, _)| name.to_string())
            .collect();
        Ok(true)
    }
}

/// `1 / n` for each selected name.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeighEqually;

impl Algo for WeighEqually {
    fn run(&mut self, _tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError> {
        let n = temp.selected.len();
        temp.weights = temp
            .selected
            .iter()
            .map(|name| (name.clone(), 1.0 / n as f64))
            .collect();
        Ok(true)
    }
}

/// Fixed target weights, regardless of the selection.
#[derive(Debug, Clone, Default)]
pub struct WeighSpecified {
    weights: Vec<(String, f64)>,
}

impl WeighSpecified {
    pub fn new<S: Into<String>>(weights: Vec<(S, f64)>) -> Self {
        WeighSpecified {
            weights: weights.into_iter().map(|(n, w)| (n.into(), w)).collect(),
        }
    }
}

impl Algo for WeighSpecified {
    fn run(&mut self, _tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError> {
        temp.weights = self.weights.clone();
        Ok(true)
    }
}

/// Trades the root's children to `temp.weights`.
///
/// Children missing from the weights are closed first. Each target then moves
/// to `weight * root value`, measured after those closes; reductions trade
/// before increases.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rebalance;

impl Algo for Rebalance {
    fn run(&mut self, tree: &mut Tree, temp: &mut Temp) -> Result<bool, NavtreeError> {
        let root = tree.root();

        for child in tree.children(root).to_vec() {
            let name = tree.node(child).name().to_string();
            if temp.weight(&name).is_none() && tree.value(child)? != 0.0 {
                tree.close(root, &name)?;
            }
        }

        let base = tree.value(root)?;
        let mut orders = Vec::with_capacity(temp.weights.len());
        for (name, weight) in &temp.weights {
            let current = match tree.child(root, name) {
                Some(child) => tree.value(child)?,
                None => 0.0,
            };
            orders.push((name.as_str(), *weight, base * weight - current));
        }
        orders.sort_by(|a, b| a.2.total_cmp(&b.2));

        for (name, weight, delta) in orders {
            if weight == 0.0 {
                if tree.child(root, name).is_some() {
                    tree.close(root, name)?;
                }
            } else if delta != 0.0 {
                tree.allocate_to(root, name, delta)?;
            }
        }
        debug!(date = ?tree.now(), targets = temp.weights.len(), "rebalanced");
        Ok(true)
    }
}
