use std::sync::Arc;

use arrow::array::{BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;

const ROWS: usize = 1_500;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct Order {
    id: i64,
    date: String,
    category: &'static str,
    region: &'static str,
    amount: Option<f64>,
    returned: bool,
    note: String,
}

fn generate_orders(rng: &mut SimpleRng) -> Vec<Order> {
    let categories = ["Books", "Electronics", "Garden", "Toys", "Grocery"];
    let regions = ["North", "South", "East", "West"];
    let adjectives = ["quick", "late", "gift", "bulk", "repeat", "online", "in-store"];
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid start date");

    (0..ROWS)
        .map(|i| {
            let category = rng.pick(&categories);
            let base = match category {
                "Electronics" => 320.0,
                "Garden" => 85.0,
                "Toys" => 40.0,
                "Grocery" => 25.0,
                _ => 18.0,
            };
            let day = (rng.next_f64() * 540.0) as i64;
            // About 3% of amounts are left blank.
            let amount = (rng.next_f64() > 0.03)
                .then(|| (rng.gauss(base, base * 0.3).max(1.0) * 100.0).round() / 100.0);
            Order {
                id: 10_000 + i as i64,
                date: (start + Duration::days(day)).format("%Y-%m-%d").to_string(),
                category,
                region: rng.pick(&regions),
                amount,
                returned: rng.next_f64() < 0.08,
                note: format!("{} order #{}", rng.pick(&adjectives), i),
            }
        })
        .collect()
}

fn write_csv(orders: &[Order], path: &str) {
    let mut writer = csv::Writer::from_path(path).expect("Failed to create CSV file");
    writer
        .write_record(["order_id", "date", "category", "region", "amount", "returned", "notes"])
        .expect("Failed to write header");
    for o in orders {
        writer
            .write_record([
                o.id.to_string(),
                o.date.clone(),
                o.category.to_string(),
                o.region.to_string(),
                o.amount.map(|a| a.to_string()).unwrap_or_default(),
                if o.returned { "yes" } else { "no" }.to_string(),
                o.note.clone(),
            ])
            .expect("Failed to write row");
    }
    writer.flush().expect("Failed to flush CSV");
}

fn write_parquet(orders: &[Order], path: &str) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("date", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("amount", DataType::Float64, true),
        Field::new("returned", DataType::Boolean, false),
        Field::new("notes", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(orders.iter().map(|o| o.id))),
            Arc::new(StringArray::from_iter_values(orders.iter().map(|o| o.date.as_str()))),
            Arc::new(StringArray::from_iter_values(orders.iter().map(|o| o.category))),
            Arc::new(StringArray::from_iter_values(orders.iter().map(|o| o.region))),
            Arc::new(Float64Array::from(orders.iter().map(|o| o.amount).collect::<Vec<_>>())),
            Arc::new(BooleanArray::from(orders.iter().map(|o| o.returned).collect::<Vec<_>>())),
            Arc::new(StringArray::from_iter_values(orders.iter().map(|o| o.note.as_str()))),
        ],
    )
    .expect("Failed to create RecordBatch");

    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}

fn main() {
    let mut rng = SimpleRng::new(42);
    let orders = generate_orders(&mut rng);

    write_csv(&orders, "sample_sales.csv");
    write_parquet(&orders, "sample_sales.parquet");

    println!(
        "Wrote {} orders to sample_sales.csv and sample_sales.parquet",
        orders.len()
    );
}
