use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// One sales record; `None` marks a blank cell.
#[derive(Clone)]
struct Row {
    id: i64,
    region: Option<String>,
    channel: Option<String>,
    units: Option<f64>,
    price: f64,
    discount: Option<f64>,
    revenue: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn generate(rng: &mut StdRng, n: usize) -> Result<Vec<Row>> {
    let regions = ["north", "south", "east", "west"];
    let channels = ["online", "retail", "partner"];
    let units_dist = Normal::<f64>::new(40.0, 12.0)?;
    let price_dist = Normal::<f64>::new(25.0, 6.0)?;
    let noise = Normal::new(0.0, 15.0)?;

    let mut rows: Vec<Row> = (0..n)
        .map(|i| {
            let units: f64 = units_dist.sample(rng).max(1.0).round();
            let price = round2(price_dist.sample(rng).max(2.0));
            let discount = round2(rng.gen_range(0.0..0.3));
            let revenue = round2(units * price * (1.0 - discount) + noise.sample(rng));
            Row {
                id: i as i64 + 1,
                region: (!rng.gen_bool(0.04))
                    .then(|| regions.choose(rng).map(|s| s.to_string()))
                    .flatten(),
                channel: (!rng.gen_bool(0.06))
                    .then(|| channels.choose(rng).map(|s| s.to_string()))
                    .flatten(),
                units: (!rng.gen_bool(0.05)).then_some(units),
                price,
                discount: (!rng.gen_bool(0.08)).then_some(discount),
                revenue,
            }
        })
        .collect();

    // A handful of exact duplicates for the cleaning demo.
    for i in (0..n).step_by(37) {
        rows.push(rows[i].clone());
    }
    Ok(rows)
}

fn write_csv(rows: &[Row], path: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {path}"))?;
    writer.write_record(["id", "region", "channel", "units", "price", "discount", "revenue"])?;
    let opt = |v: Option<f64>| v.map(|f| f.to_string()).unwrap_or_default();
    for r in rows {
        writer.write_record([
            r.id.to_string(),
            r.region.clone().unwrap_or_default(),
            r.channel.clone().unwrap_or_default(),
            opt(r.units),
            r.price.to_string(),
            opt(r.discount),
            r.revenue.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(rows: &[Row], path: &str) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("region", DataType::Utf8, true),
        Field::new("channel", DataType::Utf8, true),
        Field::new("units", DataType::Float64, true),
        Field::new("price", DataType::Float64, false),
        Field::new("discount", DataType::Float64, true),
        Field::new("revenue", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id))),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.region.as_deref()))),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.channel.as_deref()))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.units))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.price))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.discount))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.revenue))),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let rows = generate(&mut rng, 500)?;

    write_csv(&rows, "sample_sales.csv")?;
    write_parquet(&rows, "sample_sales.parquet")?;

    println!(
        "Wrote {} rows to sample_sales.csv and sample_sales.parquet",
        rows.len()
    );
    Ok(())
}
