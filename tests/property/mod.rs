// Property-based tests module
// Tests that verify codec and id generator properties over many inputs

mod object_id_uniqueness_test;
