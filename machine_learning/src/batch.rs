use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD};

use crate::{MlErr, Result};

/// One step's worth of data: named input fields plus the mandatory labels.
#[derive(Debug, Clone)]
pub struct Batch {
    fields: BTreeMap<String, ArrayD<f32>>,
    label: Array1<usize>,
    ids: Option<Vec<u64>>,
}

impl Batch {
    /// Creates a new `Batch` holding only its labels.
    ///
    /// # Arguments
    /// * `label` - The class of every example in the batch.
    pub fn new(label: Array1<usize>) -> Self {
        Self {
            fields: BTreeMap::new(),
            label,
            ids: None,
        }
    }

    /// Adds an input field, replacing any previous field with the same name.
    pub fn with_field(mut self, name: impl Into<String>, values: ArrayD<f32>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }

    /// Attaches the dataset-wide identifiers of the examples, needed to merge
    /// predictions made on different ranks.
    pub fn with_ids(mut self, ids: Vec<u64>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Returns the field named `name` or a `MissingField` error.
    pub fn field(&self, name: &str) -> Result<ArrayViewD<'_, f32>> {
        self.fields
            .get(name)
            .map(|values| values.view())
            .ok_or_else(|| MlErr::MissingField {
                name: name.to_string(),
            })
    }

    pub fn label(&self) -> ArrayView1<'_, usize> {
        self.label.view()
    }

    pub fn ids(&self) -> Option<&[u64]> {
        self.ids.as_deref()
    }

    /// The amount of examples in the batch.
    pub fn len(&self) -> usize {
        self.label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }

    /// Applies `f` to every input field.
    pub fn map_fields<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(ArrayD<f32>) -> ArrayD<f32>,
    {
        self.fields = self
            .fields
            .into_iter()
            .map(|(name, values)| (name, f(values)))
            .collect();
        self
    }

    /// Splits the batch into its labels and ids, dropping the inputs.
    pub(crate) fn into_targets(self) -> (Array1<usize>, Option<Vec<u64>>) {
        (self.label, self.ids)
    }
}

/// Where the model computes.
///
/// Placing a batch makes it ready for the model, a batch that is already placed
/// by the distributed runtime skips this step.
pub trait Device {
    fn name(&self) -> &str;
    fn place(&self, batch: Batch) -> Batch;
}

/// Host memory, placing a batch turns every field into a contiguous standard layout array.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cpu;

impl Device for Cpu {
    fn name(&self) -> &str {
        "cpu"
    }

    fn place(&self, batch: Batch) -> Batch {
        batch.map_fields(|values| {
            if values.is_standard_layout() {
                values
            } else {
                values.as_standard_layout().into_owned()
            }
        })
    }
}
