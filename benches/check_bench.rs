use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

fn template(rows: usize) -> String {
    let mut html = String::from(
        "<!DOCTYPE html><html><head><style>@media (max-width: 600px) { td { display: block; } }</style></head><body>",
    );
    for i in 0..rows {
        html.push_str(&format!(
            "<table style=\"width:600px\"><tr><td style=\"padding:8px\"><img src=\"p{i}.png\"{}></td></tr></table>",
            if i % 3 == 0 { "" } else { " alt=\"product\"" }
        ));
    }
    html.push_str("</body></html>");
    html
}

fn bench_validate(c: &mut Criterion) {
    let small = template(10);
    let large = template(500);

    c.bench_function("validate_small_template", |b| {
        b.iter(|| mailproof::validation::validate(black_box(&small)))
    });
    c.bench_function("validate_large_template", |b| {
        b.iter(|| mailproof::validation::validate(black_box(&large)))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let img = RgbaImage::from_fn(375, 667, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, ((x + y) % 256) as u8]));
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();

    c.bench_function("normalize_mobile_capture", |b| {
        b.iter(|| mailproof::normalize::normalize(black_box(&png)).unwrap())
    });
}

criterion_group!(benches, bench_validate, bench_normalize);
criterion_main!(benches);
