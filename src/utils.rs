pub(crate) mod alarm;
