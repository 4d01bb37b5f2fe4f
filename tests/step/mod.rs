mod fault_tolerance;
