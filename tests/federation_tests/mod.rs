mod container_test;
mod resolver_test;
