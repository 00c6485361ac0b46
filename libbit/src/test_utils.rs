use rand::Rng;

pub fn generate_random_string(range: std::ops::Range<usize>) -> String {
    let size = rand::thread_rng().gen_range(range);
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}
