mod backup_flow_tests;
mod multi_tenant_isolation_tests;
mod tenant_lifecycle_tests;
