pub(crate) mod async_task;

pub(crate) mod time;

#[cfg(test)]
mod async_task_test;

#[cfg(test)]
mod time_test;
