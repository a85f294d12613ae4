mod execute_test;
mod scenario_test;
