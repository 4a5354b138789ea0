//! Arrays of any rank with per-dimension lower bounds.

use super::error::ScriptError;
use super::types::TypeDesc;
use super::value::Value;

#[derive(Debug)]
pub struct ArrayData {
    pub element: TypeDesc,
    pub lengths: Vec<usize>,
    pub lower_bounds: Vec<i64>,
    /// Row-major storage.
    pub items: Vec<Value>,
}

impl ArrayData {
    /// Zero-based array filled with the element type's default value.
    pub fn new(element: TypeDesc, lengths: Vec<usize>) -> Self {
        let lower_bounds = vec![0; lengths.len()];
        Self::with_bounds(element, lengths, lower_bounds)
    }

    pub fn with_bounds(element: TypeDesc, lengths: Vec<usize>, lower_bounds: Vec<i64>) -> Self {
        let total = lengths.iter().product();
        let default = Value::default_for(&element);
        ArrayData {
            element,
            lengths,
            lower_bounds,
            items: vec![default; total],
        }
    }

    pub fn from_items(element: TypeDesc, items: Vec<Value>) -> Self {
        ArrayData {
            element,
            lengths: vec![items.len()],
            lower_bounds: vec![0],
            items,
        }
    }

    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn lower_bound(&self, dimension: usize) -> i64 {
        self.lower_bounds[dimension]
    }

    /// Inclusive upper bound; `lower - 1` for an empty dimension.
    pub fn upper_bound(&self, dimension: usize) -> i64 {
        self.lower_bounds[dimension] + self.lengths[dimension] as i64 - 1
    }

    pub fn type_desc(&self) -> TypeDesc {
        TypeDesc::array_of(self.element.clone(), self.rank())
    }

    /// Translates per-dimension indices into a storage offset.
    pub fn offset(&self, indices: &[i64]) -> Result<usize, ScriptError> {
        if indices.len() != self.rank() {
            return Err(ScriptError::argument(
                "Array was not a one-dimensional array.".to_string(),
            ));
        }
        let mut offset = 0usize;
        for (dimension, index) in indices.iter().enumerate() {
            let relative = index - self.lower_bounds[dimension];
            if relative < 0 || relative as usize >= self.lengths[dimension] {
                return Err(ScriptError::index_out_of_range());
            }
            offset = offset * self.lengths[dimension] + relative as usize;
        }
        Ok(offset)
    }

    pub fn get(&self, indices: &[i64]) -> Result<Value, ScriptError> {
        let offset = self.offset(indices)?;
        Ok(self.items[offset].clone())
    }

    pub fn set(&mut self, indices: &[i64], value: Value) -> Result<(), ScriptError> {
        let offset = self.offset(indices)?;
        self.items[offset] = value;
        Ok(())
    }

    /// True for `byte[]`.
    pub fn is_byte_vector(&self) -> bool {
        self.rank() == 1 && self.element.is(super::types::TypeKind::Byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ds::types::TypeKind;

    #[test]
    fn offsets_honour_lower_bounds() {
        let mut array = ArrayData::with_bounds(TypeDesc::of(TypeKind::Int32), vec![3, 2], vec![1, -1]);
        assert_eq!(array.upper_bound(0), 3);
        assert_eq!(array.upper_bound(1), 0);
        array.set(&[2, 0], Value::Int(7)).unwrap();
        assert_eq!(array.offset(&[2, 0]).unwrap(), 3);
        assert!(matches!(array.get(&[2, 0]).unwrap(), Value::Int(7)));
        assert!(array.get(&[0, 0]).is_err());
    }
}
