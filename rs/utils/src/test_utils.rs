use rand::Rng;

// Generate a random vector with a given dimension
pub fn generate_random_vector(dimension: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    let mut vector = vec![];
    for _ in 0..dimension {
        vector.push(rng.gen::<f32>());
    }
    vector
}

/// Element-wise `|a - b| <= atol + rtol * |b|`, with numpy's default tolerances.
pub fn allclose(a: &[f64], b: &[f64]) -> bool {
    allclose_with(a, b, 1e-5, 1e-8)
}

pub fn allclose_with(a: &[f64], b: &[f64], rtol: f64, atol: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .all(|(&x, &y)| (x - y).abs() <= atol + rtol * y.abs())
}
