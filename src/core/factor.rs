/// Factor algebra over discrete variables.
///
/// A factor is a table over an ordered list of variables. It serves both as
/// a node's conditional probability table and as the transient product and
/// separator tables produced during elimination.

use ndarray::{concatenate, ArrayD, ArrayViewD, Axis};

use crate::core::assignment::Assignment;
use crate::core::error::BayesError;
use crate::core::node::NodeId;
use crate::core::shape::Shape;

/// A multi-dimensional table over an ordered list of variables.
///
/// Invariant: `values.len()` equals the product of the dimension sizes. The
/// first variable is the outermost index; when used as a CPT the first
/// variable is the owning node and the slice along it sums to one for every
/// combination of the remaining (parent) variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    vars: Vec<NodeId>,
    shape: Shape,
    values: Vec<f64>,
}

impl Factor {
    /// A one-dimensional factor over `var`, one-hot at state 0.
    pub fn from_node(var: NodeId, num_states: usize) -> Self {
        let mut values = vec![0.0; num_states];
        if let Some(first) = values.first_mut() {
            *first = 1.0;
        }
        Self {
            vars: vec![var],
            shape: Shape::new(vec![num_states]),
            values,
        }
    }

    /// Build a factor from a flat row-major value array.
    pub fn from_values(
        vars: Vec<NodeId>,
        dims: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, BayesError> {
        if vars.len() != dims.len() {
            return Err(BayesError::InvalidShape {
                expected: vars.len(),
                got: dims.len(),
            });
        }
        for (i, var) in vars.iter().enumerate() {
            if vars[..i].contains(var) {
                return Err(BayesError::DuplicateVariable(var.to_string()));
            }
        }
        let shape = Shape::new(dims);
        if values.len() != shape.len() {
            return Err(BayesError::InvalidShape {
                expected: shape.len(),
                got: values.len(),
            });
        }
        Ok(Self {
            vars,
            shape,
            values,
        })
    }

    /// The empty-scope factor holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            vars: Vec::new(),
            shape: Shape::scalar(),
            values: vec![value],
        }
    }

    /// The variables this factor ranges over, outermost first.
    pub fn vars(&self) -> &[NodeId] {
        &self.vars
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Flat values in row-major order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Replace every value, keeping scope and shape.
    pub fn set_values(&mut self, values: Vec<f64>) -> Result<(), BayesError> {
        if values.len() != self.shape.len() {
            return Err(BayesError::InvalidShape {
                expected: self.shape.len(),
                got: values.len(),
            });
        }
        self.values = values;
        Ok(())
    }

    pub fn axis_of(&self, var: NodeId) -> Option<usize> {
        self.vars.iter().position(|v| *v == var)
    }

    pub fn contains(&self, var: NodeId) -> bool {
        self.vars.contains(&var)
    }

    /// Value at a full multi-index (one state per variable, in scope order).
    pub fn value(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.ndim()
            || index.iter().zip(self.shape.dims()).any(|(i, d)| i >= d)
        {
            return None;
        }
        self.values.get(self.shape.flat_index(index)).copied()
    }

    /// Value at a flat row-major offset.
    pub fn value_at(&self, flat: usize) -> f64 {
        self.values.get(flat).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    fn view(&self) -> ArrayViewD<'_, f64> {
        // Shape and value length always agree, so this view cannot fail.
        ArrayViewD::from_shape(self.shape.ix(), &self.values)
            .unwrap_or_else(|_| unreachable!("factor shape out of sync with values"))
    }

    fn from_array(vars: Vec<NodeId>, table: ArrayD<f64>) -> Self {
        let shape = Shape::new(table.shape().to_vec());
        let values = table.iter().copied().collect();
        Self {
            vars,
            shape,
            values,
        }
    }

    /// Rebuild from an ndarray result whose shape the caller derived with a
    /// [`Shape`] transform.
    fn from_parts(vars: Vec<NodeId>, shape: Shape, table: ArrayD<f64>) -> Result<Self, BayesError> {
        if table.shape() != shape.dims() {
            return Err(BayesError::InvalidShape {
                expected: shape.len(),
                got: table.len(),
            });
        }
        let values = table.iter().copied().collect();
        Ok(Self {
            vars,
            shape,
            values,
        })
    }

    fn check_axis(&self, axis: usize) -> Result<usize, BayesError> {
        self.shape
            .dim(axis)
            .ok_or_else(|| BayesError::NotInScope(format!("axis {axis}")))
    }

    fn check_state(&self, axis: usize, state: usize) -> Result<(), BayesError> {
        let size = self.check_axis(axis)?;
        if state >= size {
            return Err(BayesError::UnknownState {
                variable: self.vars[axis].to_string(),
                state: state.to_string(),
            });
        }
        Ok(())
    }

    // --- structural edits -------------------------------------------------

    /// Append `var` as the new fastest-varying dimension, broadcasting every
    /// existing entry across its states.
    pub fn add_variable(&mut self, var: NodeId, num_states: usize) -> Result<(), BayesError> {
        if self.contains(var) {
            return Err(BayesError::DuplicateVariable(var.to_string()));
        }
        let shape = self.shape.push_dim(num_states);
        let values = self
            .values
            .iter()
            .flat_map(|v| std::iter::repeat(*v).take(num_states))
            .collect();
        self.vars.push(var);
        self.shape = shape;
        self.values = values;
        Ok(())
    }

    /// Collapse dimension `axis` by selecting `chosen_state`.
    pub fn remove_variable(&mut self, axis: usize, chosen_state: usize) -> Result<(), BayesError> {
        self.check_state(axis, chosen_state)?;
        let table = self.view().index_axis(Axis(axis), chosen_state).to_owned();
        let mut vars = self.vars.clone();
        vars.remove(axis);
        *self = Self::from_parts(vars, self.shape.remove_dim(axis), table)?;
        Ok(())
    }

    /// Grow dimension `axis` by one state, duplicating the previously last
    /// slice into the new one. Callers must set real probabilities for the
    /// new state afterwards.
    pub fn add_state(&mut self, axis: usize) -> Result<(), BayesError> {
        let size = self.check_axis(axis)?;
        let view = self.view();
        let last = view.index_axis(Axis(axis), size - 1).insert_axis(Axis(axis));
        let table = concatenate(Axis(axis), &[view.view(), last])
            .map_err(|e| BayesError::Format(e.to_string()))?;
        *self = Self::from_parts(self.vars.clone(), self.shape.resize_dim(axis, size + 1), table)?;
        Ok(())
    }

    /// Remove one state from dimension `axis`, then restore conditional
    /// normalization along the owning dimension.
    pub fn remove_state(&mut self, axis: usize, state: usize) -> Result<(), BayesError> {
        self.check_state(axis, state)?;
        let size = self.shape.dims()[axis];
        if size == 1 {
            return Err(BayesError::LastState(self.vars[axis].to_string()));
        }
        let kept: Vec<usize> = (0..size).filter(|s| *s != state).collect();
        let table = self.view().select(Axis(axis), &kept);
        *self = Self::from_parts(self.vars.clone(), self.shape.resize_dim(axis, size - 1), table)?;
        self.normalize_conditional();
        Ok(())
    }

    // --- normalization ----------------------------------------------------

    /// Scale every value so the table sums to one; returns the sum before
    /// scaling. A zero-sum table is left untouched.
    pub fn normalize(&mut self) -> f64 {
        let total = self.total();
        if total > 0.0 {
            for v in &mut self.values {
                *v /= total;
            }
        }
        total
    }

    /// Normalize, failing if the sum was not within `tolerance` of one.
    pub fn normalize_checked(&mut self, tolerance: f64) -> Result<(), BayesError> {
        let sum = self.total();
        if !((sum - 1.0).abs() <= tolerance) {
            return Err(BayesError::Denormalized { sum, tolerance });
        }
        self.normalize();
        Ok(())
    }

    /// Normalize along the owning (first) dimension.
    pub fn normalize_conditional(&mut self) {
        self.normalize_conditional_on(0);
    }

    /// Make every slice along `axis` sum to one for each fixed combination
    /// of the other dimensions. All-zero slices become uniform.
    pub fn normalize_conditional_on(&mut self, axis: usize) {
        if axis >= self.shape.ndim() {
            self.normalize();
            return;
        }
        let mut table = self.view().to_owned();
        for mut lane in table.lanes_mut(Axis(axis)) {
            let sum = lane.sum();
            if sum > 0.0 {
                lane.mapv_inplace(|v| v / sum);
            } else {
                let uniform = 1.0 / lane.len() as f64;
                lane.fill(uniform);
            }
        }
        self.values = table.iter().copied().collect();
    }

    /// Check conditional normalization along the first dimension without
    /// modifying the table.
    pub fn check_conditional(&self, tolerance: f64) -> Result<(), BayesError> {
        if self.shape.ndim() == 0 {
            let sum = self.total();
            if !((sum - 1.0).abs() <= tolerance) {
                return Err(BayesError::Denormalized { sum, tolerance });
            }
            return Ok(());
        }
        for lane in self.view().lanes(Axis(0)) {
            let sum = lane.sum();
            if !((sum - 1.0).abs() <= tolerance) {
                return Err(BayesError::Denormalized { sum, tolerance });
            }
        }
        Ok(())
    }

    // --- products and marginals ---------------------------------------------

    /// Product of any number of factors, over the union of their scopes.
    ///
    /// The union keeps the first factor's order and appends unseen variables
    /// in order of appearance.
    pub fn multiply(factors: &[&Factor]) -> Result<Factor, BayesError> {
        let mut vars: Vec<NodeId> = Vec::new();
        let mut dims: Vec<usize> = Vec::new();
        for factor in factors {
            for (var, dim) in factor.vars.iter().zip(factor.shape.dims()) {
                match vars.iter().position(|v| v == var) {
                    Some(pos) if dims[pos] != *dim => {
                        return Err(BayesError::InvalidShape {
                            expected: dims[pos],
                            got: *dim,
                        });
                    }
                    Some(_) => {}
                    None => {
                        vars.push(*var);
                        dims.push(*dim);
                    }
                }
            }
        }

        let union = Shape::new(dims);
        let mut table = ArrayD::<f64>::ones(union.ix());
        for factor in factors {
            factor.multiply_into(&mut table, &vars)?;
        }
        Ok(Self::from_array(vars, table))
    }

    /// Product of `self` and `other`.
    pub fn product(&self, other: &Factor) -> Result<Factor, BayesError> {
        Self::multiply(&[self, other])
    }

    /// Multiply this table into `table`, whose axes follow `vars`. Axes are
    /// permuted into `vars` order and broadcast across the dimensions this
    /// factor does not mention.
    fn multiply_into(&self, table: &mut ArrayD<f64>, vars: &[NodeId]) -> Result<(), BayesError> {
        let mut positions: Vec<(usize, usize)> = Vec::with_capacity(self.vars.len());
        for (axis, var) in self.vars.iter().enumerate() {
            let pos = vars
                .iter()
                .position(|v| v == var)
                .ok_or_else(|| BayesError::NotInScope(var.to_string()))?;
            positions.push((pos, axis));
        }
        positions.sort_unstable();
        let perm: Vec<usize> = positions.iter().map(|(_, axis)| *axis).collect();

        let mut view = self.view().permuted_axes(perm);
        for (pos, var) in vars.iter().enumerate() {
            if !self.contains(*var) {
                view = view.insert_axis(Axis(pos));
            }
        }
        let aligned = view
            .broadcast(table.raw_dim())
            .ok_or(BayesError::InvalidShape {
                expected: table.len(),
                got: self.shape.len(),
            })?;
        *table *= &aligned;
        Ok(())
    }

    /// Marginalize the named variables out by summation.
    pub fn sum_out(&self, vars: &[NodeId]) -> Result<Factor, BayesError> {
        for var in vars {
            if !self.contains(*var) {
                return Err(BayesError::NotInScope(var.to_string()));
            }
        }
        let mut table = self.view().to_owned();
        let mut remaining = self.vars.clone();
        for var in vars {
            if let Some(axis) = remaining.iter().position(|v| v == var) {
                table = table.sum_axis(Axis(axis));
                remaining.remove(axis);
            }
        }
        Ok(Self::from_array(remaining, table))
    }

    /// Marginalize out every variable except the named ones.
    pub fn sum_out_except(&self, keep: &[NodeId]) -> Result<Factor, BayesError> {
        for var in keep {
            if !self.contains(*var) {
                return Err(BayesError::NotInScope(var.to_string()));
            }
        }
        let drop: Vec<NodeId> = self
            .vars
            .iter()
            .filter(|v| !keep.contains(v))
            .copied()
            .collect();
        self.sum_out(&drop)
    }

    /// Condition on the evidence in `ctx`: every observed dimension is
    /// collapsed by selecting its observed state.
    pub fn remove_observed(&mut self, ctx: &Assignment) -> Result<(), BayesError> {
        for axis in (0..self.vars.len()).rev() {
            if let Some(state) = ctx.evidence(self.vars[axis]) {
                self.remove_variable(axis, state)?;
            }
        }
        Ok(())
    }

    /// Most probable state of the first dimension given the current states
    /// of all other dimensions in `ctx`. Ties go to the lowest state index.
    pub fn most_likely(&self, ctx: &Assignment) -> Result<usize, BayesError> {
        let size = self
            .shape
            .dim(0)
            .ok_or_else(|| BayesError::NotInScope("axis 0".to_string()))?;
        let mut index: Vec<usize> = self.vars.iter().map(|v| ctx.state(*v)).collect();
        for (axis, state) in index.iter().enumerate().skip(1) {
            if *state >= self.shape.dims()[axis] {
                return Err(BayesError::UnknownState {
                    variable: self.vars[axis].to_string(),
                    state: state.to_string(),
                });
            }
        }

        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for state in 0..size {
            index[0] = state;
            let value = self.values[self.shape.flat_index(&index)];
            if value > best_value {
                best = state;
                best_value = value;
            }
        }
        Ok(best)
    }
}
