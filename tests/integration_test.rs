mod integration {
    pub mod boundary_test;
    pub mod bootstrap_test;
    pub mod candidate_pool_test;
    pub mod fixtures;
    pub mod instance_lifecycle_test;
    pub mod rename_test;
}
