use anyhow::{bail, Context as _, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value as JsonValue;

use super::model::Value;
use super::output::Output;
use crate::config::{arg_bool, arg_string_list, Args};
use crate::context::Context;

// ---------------------------------------------------------------------------
// Train/test split  (split::train_test_split)
// ---------------------------------------------------------------------------

/// Split every field along its leading axis with one shared permutation.
///
/// Returns `[train_0, .., train_n, test_0, .., test_n]`.
///
/// Args:
/// * `test_size`    – fraction in `(0, 1)` or an absolute row count
/// * `shuffle`      – permute rows before splitting (default `true`)
/// * `random_state` – seed for the permutation
pub fn train_test_split(fields: Vec<Value>, args: &Args) -> Result<Vec<Value>> {
    let n_rows = common_rows(&fields)?;
    let n_test = test_rows(args.get("test_size"), n_rows)?;
    let n_train = n_rows - n_test;

    let mut order: Vec<usize> = (0..n_rows).collect();
    if arg_bool(args, "shuffle")?.unwrap_or(true) {
        let mut rng = match args.get("random_state").and_then(JsonValue::as_u64) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        order.shuffle(&mut rng);
    }
    let (train_idx, test_idx) = order.split_at(n_train);

    log::debug!(
        "train/test split: {} training, {} test rows across {} fields",
        train_idx.len(),
        test_idx.len(),
        fields.len()
    );

    let mut out = Vec::with_capacity(fields.len() * 2);
    for field in &fields {
        out.push(field.take(train_idx)?);
    }
    for field in &fields {
        out.push(field.take(test_idx)?);
    }
    Ok(out)
}

fn common_rows(fields: &[Value]) -> Result<usize> {
    let mut rows = None;
    for (i, field) in fields.iter().enumerate() {
        let n = field
            .n_rows()
            .with_context(|| format!("field {i} ({}) has no rows to split", field.kind()))?;
        match rows {
            None => rows = Some(n),
            Some(m) if m != n => bail!("field {i} has {n} rows, expected {m}"),
            Some(_) => {}
        }
    }
    rows.context("nothing to split")
}

/// Number of test rows: `ceil(fraction * n)` or an absolute count.
fn test_rows(test_size: Option<&JsonValue>, n_rows: usize) -> Result<usize> {
    let Some(size) = test_size else {
        bail!("test_size is required");
    };
    let n_test = if let Some(count) = size.as_u64() {
        count as usize
    } else if let Some(frac) = size.as_f64() {
        if !(0.0..1.0).contains(&frac) {
            bail!("fractional test_size must lie in (0, 1), got {frac}");
        }
        (frac * n_rows as f64).ceil() as usize
    } else {
        bail!("test_size must be a number, got {size}");
    };
    if n_test > n_rows {
        bail!("test_size {n_test} exceeds the {n_rows} available rows");
    }
    Ok(n_test)
}

// ---------------------------------------------------------------------------
// Column-role split  (split_xy::columns)
// ---------------------------------------------------------------------------

/// Split a single frame into `[X, Y]` or `[X, Y, misc]` by column roles.
///
/// Column lists come from `x`, `y`, `misc` args, falling back to
/// `input_pars.col_Xinput`, `col_Yinput`, `col_miscinput`. Without an
/// explicit X list, X takes every column not claimed by Y or misc.
pub fn split_columns(data: Output, context: &Context, args: &Args) -> Result<Output> {
    let Output::Single(Value::Frame(frame)) = data else {
        bail!("column split needs a single frame, got a {}", data.case_name());
    };

    let role = |arg: &str, hint: &str| -> Result<Option<Vec<String>>> {
        match arg_string_list(args, arg)? {
            Some(cols) => Ok(Some(cols)),
            None => arg_string_list(context.input_pars(), hint),
        }
    };
    let y_cols = role("y", "col_Yinput")?.context("no label columns (col_Yinput) configured")?;
    let misc_cols = role("misc", "col_miscinput")?;
    let x_cols = match role("x", "col_Xinput")? {
        Some(cols) => cols,
        None => frame
            .columns
            .iter()
            .filter(|c| !y_cols.contains(c))
            .filter(|c| misc_cols.as_ref().map_or(true, |m| !m.contains(c)))
            .cloned()
            .collect(),
    };

    let mut parts = vec![
        Value::Frame(frame.select_columns(&x_cols)?),
        Value::Frame(frame.select_columns(&y_cols)?),
    ];
    if let Some(misc) = misc_cols {
        parts.push(Value::Frame(frame.select_columns(&misc)?));
    }
    Ok(Output::Sequence(parts))
}
