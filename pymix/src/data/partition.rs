use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};
use crate::models::SufficientStatistic;

/// Identifier of a table.
///
/// Identifiers are issued in increasing order and never reused, so ordering
/// by id is ordering by creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(u64);

impl ClusterId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Occupants of one table and the statistic summarizing their observations.
#[derive(Clone, Debug, PartialEq)]
pub struct Table<T> {
    customers: BTreeSet<usize>,
    stat: T,
}

impl<T> Table<T> {
    #[must_use]
    pub const fn customers(&self) -> &BTreeSet<usize> {
        &self.customers
    }

    #[must_use]
    pub const fn stat(&self) -> &T {
        &self.stat
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.customers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

/// Seating arrangement of customers `0..n_customers` at tables.
///
/// Empty tables never survive an operation.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusteringState<T> {
    tables: BTreeMap<ClusterId, Table<T>>,
    assignments: Vec<Option<ClusterId>>,
    next_id: u64,
}

impl<T> ClusteringState<T> {
    /// Create a state for `n_customers` customers, none of them seated.
    #[must_use]
    pub fn new(n_customers: usize) -> Self {
        Self {
            tables: BTreeMap::new(),
            assignments: vec![None; n_customers],
            next_id: 0,
        }
    }

    /// Number of customers, seated or not.
    #[must_use]
    pub fn n_customers(&self) -> usize {
        self.assignments.len()
    }

    /// Number of occupied tables.
    #[must_use]
    pub fn n_tables(&self) -> usize {
        self.tables.len()
    }

    /// Table ids in order of creation.
    pub fn cluster_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.tables.keys().copied()
    }

    /// Tables in order of creation.
    pub fn tables(&self) -> impl Iterator<Item = (ClusterId, &Table<T>)> + '_ {
        self.tables.iter().map(|(id, table)| (*id, table))
    }

    #[must_use]
    pub fn table(&self, id: ClusterId) -> Option<&Table<T>> {
        self.tables.get(&id)
    }

    /// Occupancy of each table in order of creation.
    #[must_use]
    pub fn counts(&self) -> Vec<usize> {
        self.tables.values().map(Table::len).collect()
    }

    /// The table of `customer`, if seated.
    #[must_use]
    pub fn assignment(&self, customer: usize) -> Option<ClusterId> {
        self.assignments.get(customer).copied().flatten()
    }

    #[must_use]
    pub fn assignments(&self) -> &[Option<ClusterId>] {
        &self.assignments
    }

    /// Check that the occupant sets partition every customer exactly once and
    /// agree with the assignment vector.
    #[must_use]
    pub fn is_exact_partition(&self) -> bool {
        let mut seen = vec![false; self.assignments.len()];
        for (id, table) in &self.tables {
            if table.customers.is_empty() {
                return false;
            }
            for &customer in &table.customers {
                if customer >= seen.len()
                    || seen[customer]
                    || self.assignments[customer] != Some(*id)
                {
                    return false;
                }
                seen[customer] = true;
            }
        }
        seen.into_iter().all(|s| s)
    }

    fn issue_id(&mut self) -> ClusterId {
        let id = ClusterId(self.next_id);
        self.next_id += 1;
        id
    }

    fn ensure_customer(&mut self, customer: usize) {
        if customer >= self.assignments.len() {
            self.assignments.resize(customer + 1, None);
        }
    }
}

impl<T> ClusteringState<T> {
    /// Seat `customer` at a freshly created table whose statistic is `stat`.
    ///
    /// Any previous seating of `customer` must have been undone with
    /// [`ClusteringState::unassign`] first.
    ///
    /// # Panics
    /// If `customer` is already seated.
    pub fn assign_new(&mut self, customer: usize, stat: T) -> ClusterId {
        self.ensure_customer(customer);
        assert!(
            self.assignments[customer].is_none(),
            "customer {customer} is already seated"
        );

        let id = self.issue_id();
        self.tables.insert(
            id,
            Table {
                customers: BTreeSet::from([customer]),
                stat,
            },
        );
        self.assignments[customer] = Some(id);
        id
    }

    /// Seat `customer`, observed as `x`, at the existing table `id`.
    ///
    /// # Panics
    /// If `customer` is already seated or `id` is not an occupied table.
    pub fn assign<X>(&mut self, customer: usize, id: ClusterId, x: &X)
    where
        T: SufficientStatistic<X>,
    {
        self.ensure_customer(customer);
        assert!(
            self.assignments[customer].is_none(),
            "customer {customer} is already seated"
        );

        let table = self
            .tables
            .get_mut(&id)
            .unwrap_or_else(|| panic!("table {id} does not exist"));
        table.stat.observe(x);
        table.customers.insert(customer);
        self.assignments[customer] = Some(id);
    }

    /// Remove `customer`, observed as `x`, from its table, deleting the table
    /// if it becomes empty. Returns the table the customer left.
    ///
    /// # Errors
    /// If `customer` is not seated.
    pub fn unassign<X>(&mut self, customer: usize, x: &X) -> Result<ClusterId>
    where
        T: SufficientStatistic<X>,
    {
        let id = self
            .assignments
            .get_mut(customer)
            .and_then(Option::take)
            .ok_or(Error::UnseatedCustomer(customer))?;

        let table = self
            .tables
            .get_mut(&id)
            .expect("assignments only reference occupied tables");
        table.customers.remove(&customer);
        if table.customers.is_empty() {
            self.tables.remove(&id);
        } else {
            table.stat.forget(x);
        }

        Ok(id)
    }
}

impl<T> ClusteringState<T> {
    /// Seat every customer alone at their own table.
    pub fn fully_disconnected<'a, X, I, F>(data: I, stat_of: F) -> Self
    where
        I: IntoIterator<Item = &'a X>,
        X: 'a,
        F: Fn(&X) -> T,
    {
        let mut state = Self::new(0);
        for (customer, x) in data.into_iter().enumerate() {
            state.assign_new(customer, stat_of(x));
        }
        state
    }

    /// Seat customers according to `labels`; equal labels share a table.
    /// Tables are created in order of first appearance of their label.
    pub fn from_labels<'a, X, I, F>(data: I, labels: &[usize], stat_of: F) -> Self
    where
        I: IntoIterator<Item = &'a X>,
        X: 'a,
        T: SufficientStatistic<X>,
        F: Fn(&X) -> T,
    {
        let mut state = Self::new(labels.len());
        let mut tables: BTreeMap<usize, ClusterId> = BTreeMap::new();
        for ((customer, x), label) in data.into_iter().enumerate().zip(labels) {
            match tables.get(label) {
                Some(&id) => state.assign(customer, id, x),
                None => {
                    let id = state.assign_new(customer, stat_of(x));
                    tables.insert(*label, id);
                }
            }
        }
        state
    }
}
