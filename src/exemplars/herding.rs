/// Greedy herding over candidate representations: repeatedly picks the
/// candidate whose addition keeps the running selection mean closest to the
/// mean of all candidates.
///
/// Embeddings are L2-normalized before the mean `mu` is taken. The running
/// weight vector starts at `mu`; each step picks the argmax of `w . d_i`
/// (first maximal index on ties) and updates `w <- w + mu - d_selected`.
/// The loop stops after `m` distinct selections or `1.1 * m` steps, whichever
/// comes first, so a repeated argmax cannot spin forever. Returns the selected
/// candidate indices in selection order, possibly fewer than `m`.
pub fn select(embeddings: &[Vec<f64>], m: usize) -> Vec<usize> {
    if embeddings.is_empty() || m == 0 {
        return Vec::new();
    }
    let dimensions = embeddings[0].len();
    let normalized: Vec<Vec<f64>> = embeddings.iter().map(|row| l2_normalize(row)).collect();

    let mut mu = vec![0.0; dimensions];
    for row in normalized.iter() {
        for (sum, value) in mu.iter_mut().zip(row.iter()) {
            *sum += value;
        }
    }
    for sum in mu.iter_mut() {
        *sum /= normalized.len() as f64;
    }

    let mut weight = mu.clone();
    let mut selected_ids: Vec<usize> = Vec::with_capacity(m);
    let mut step = 0_usize;
    while selected_ids.len() < m && (step as f64) < 1.1 * m as f64 {
        let ind_max = argmax_dot(&weight, &normalized);
        for ((w, target), value) in weight
            .iter_mut()
            .zip(mu.iter())
            .zip(normalized[ind_max].iter())
        {
            *w += target - value;
        }
        step += 1;
        if !selected_ids.contains(&ind_max) {
            selected_ids.push(ind_max);
        }
    }
    selected_ids
}

fn l2_normalize(row: &[f64]) -> Vec<f64> {
    let norm = row.iter().map(|value| value * value).sum::<f64>().sqrt();
    if norm > 0.0 {
        row.iter().map(|value| value / norm).collect()
    } else {
        row.to_vec()
    }
}

fn argmax_dot(weight: &[f64], rows: &[Vec<f64>]) -> usize {
    let mut best_index = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (index, row) in rows.iter().enumerate() {
        let score: f64 = weight.iter().zip(row.iter()).map(|(w, d)| w * d).sum();
        // strict comparison keeps the first maximal index on ties
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }
    best_index
}
