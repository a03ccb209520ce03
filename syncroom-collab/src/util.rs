use rand::{thread_rng, Rng};

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates an uppercase base-36 code, used as a short shareable room id.
pub fn random_code(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .take(length)
        .collect()
}

/// A number used to tell unregistered guests apart
pub fn guest_suffix() -> u32 {
    thread_rng().gen_range(0..1000)
}
