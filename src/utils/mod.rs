pub mod url;

#[cfg(test)]
pub mod test_utils;
