export![camera, config, crop, dirty, environment, media, stage];
