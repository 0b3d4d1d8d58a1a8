use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// What to write into entries that were not observed.
///
/// The mask always records which entries were imputed, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FillPolicy {
    #[default]
    Zero,
    Constant(f64),
    /// Last observed value of the same node; leading gaps get zero.
    ForwardFill,
}

/// Split a grid of optional readings into `(values, mask)`.
pub fn impute(cells: &Array2<Option<f64>>, policy: FillPolicy) -> (Array2<f64>, Array2<bool>) {
    let mask = cells.mapv(|c| c.is_some());
    let mut values = Array2::<f64>::zeros(cells.dim());

    for (mut out, series) in values.axis_iter_mut(Axis(1)).zip(cells.axis_iter(Axis(1))) {
        let mut last = 0.0;
        for (slot, cell) in out.iter_mut().zip(series) {
            *slot = match *cell {
                Some(v) => {
                    last = v;
                    v
                }
                None => match policy {
                    FillPolicy::Zero => 0.0,
                    FillPolicy::Constant(c) => c,
                    FillPolicy::ForwardFill => last,
                },
            };
        }
    }

    (values, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    fn grid() -> Array2<Option<f64>> {
        array![
            [None, Some(1.0)],
            [Some(2.0), None],
            [None, None],
            [Some(4.0), Some(5.0)],
        ]
    }

    #[test]
    fn zero_fill_keeps_mask() {
        let (values, mask) = impute(&grid(), FillPolicy::Zero);
        assert_eq!(values.shape(), mask.shape());
        assert_eq!(values.row(2).to_vec(), vec![0.0, 0.0]);
        assert_eq!(mask.row(2).to_vec(), vec![false, false]);
        assert_eq!(mask.row(3).to_vec(), vec![true, true]);
    }

    #[test]
    fn constant_and_forward_fill() {
        let (values, _) = impute(&grid(), FillPolicy::Constant(-1.0));
        assert_eq!(values.column(0).to_vec(), vec![-1.0, 2.0, -1.0, 4.0]);

        let (values, _) = impute(&grid(), FillPolicy::ForwardFill);
        assert_eq!(values.column(0).to_vec(), vec![0.0, 2.0, 2.0, 4.0]);
        assert_eq!(values.column(1).to_vec(), vec![1.0, 1.0, 1.0, 5.0]);
    }

    #[test]
    fn policy_deserializes_from_config() {
        let p: FillPolicy = serde_json::from_str(r#"{"kind":"constant","value":3.5}"#).unwrap();
        assert_eq!(p, FillPolicy::Constant(3.5));
        let p: FillPolicy = serde_json::from_str(r#"{"kind":"forward_fill"}"#).unwrap();
        assert_eq!(p, FillPolicy::ForwardFill);
    }
}
