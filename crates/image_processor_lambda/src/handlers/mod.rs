pub mod conversion;
pub mod daily_run;
pub mod folders;

#[cfg(test)]
pub(crate) mod fakes;
